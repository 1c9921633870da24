/*
   Copyright 2021 Rustam Kulenov

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use structopt::StructOpt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kdbx_codec::{
    AesKdf, AesKdfId, Argon2Kdf, Argon2Type, CompositeKey, DatabaseOptions, FormatVersion, KdbxDatabase,
    KdbxGroup, KdbxHeader, KdfParameters, OuterCipherSuite,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "kdbx", about = "Inspect and edit KeePass KDBX 3.1/4.x databases")]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
struct Credentials {
    /// Master password
    #[structopt(long, short = "p", env = "KDBX_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Key file, combined with the password when both are given
    #[structopt(long, parse(from_os_str))]
    key_file: Option<PathBuf>,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Print the unencrypted header
    Info {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Print the group tree with entry titles
    List {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(flatten)]
        credentials: Credentials,
    },
    /// Print the fields of the first entry with the given title
    Show {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        title: String,
        /// Print protected values instead of masking them
        #[structopt(long)]
        reveal: bool,
        #[structopt(flatten)]
        credentials: Credentials,
    },
    /// Create an empty database
    Create {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        /// Major format version, 3 or 4
        #[structopt(long, default_value = "4")]
        format: u16,
        /// aes128, aes256, chacha20 or twofish
        #[structopt(long, default_value = "aes256", parse(try_from_str = parse_cipher))]
        cipher: OuterCipherSuite,
        /// aes, argon2d or argon2id; defaults to argon2id for format 4 and aes for format 3
        #[structopt(long)]
        kdf: Option<String>,
        #[structopt(flatten)]
        credentials: Credentials,
    },
    /// Add an entry to the root group
    Add {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        #[structopt(long)]
        title: String,
        #[structopt(long)]
        username: Option<String>,
        #[structopt(long)]
        url: Option<String>,
        #[structopt(long)]
        entry_password: Option<String>,
        #[structopt(flatten)]
        credentials: Credentials,
    },
}

fn parse_cipher(name: &str) -> Result<OuterCipherSuite, String> {
    match name.to_ascii_lowercase().as_str() {
        "aes128" => Ok(OuterCipherSuite::AES128),
        "aes256" | "aes" => Ok(OuterCipherSuite::AES256),
        "chacha20" => Ok(OuterCipherSuite::ChaCha20),
        "twofish" => Ok(OuterCipherSuite::Twofish),
        other => Err(format!("unknown cipher {}", other)),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let opt = Opt::from_args();
    match opt.cmd {
        Command::Info { file } => info(&file),
        Command::List { file, credentials } => {
            let db = open(&file, &credentials)?;
            print_group(db.root(), 0);
            Ok(())
        }
        Command::Show {
            file,
            title,
            reveal,
            credentials,
        } => show(&file, &title, reveal, &credentials),
        Command::Create {
            file,
            format,
            cipher,
            kdf,
            credentials,
        } => create(&file, format, cipher, kdf.as_deref(), &credentials),
        Command::Add {
            file,
            title,
            username,
            url,
            entry_password,
            credentials,
        } => {
            let mut db = open(&file, &credentials)?;
            let mut entry = db.new_entry();
            entry.set_title(&title);
            if let Some(username) = username {
                let protect = db.meta().protects("UserName");
                entry.set("UserName", &username, protect);
            }
            if let Some(url) = url {
                let protect = db.meta().protects("URL");
                entry.set("URL", &url, protect);
            }
            if let Some(password) = entry_password {
                entry.set_password(&password);
            }
            db.root_mut().add_entry(entry);
            save(&mut db, &file, &credentials)
        }
    }
}

fn composite_key(credentials: &Credentials) -> anyhow::Result<CompositeKey> {
    let mut key = CompositeKey::new();
    if let Some(password) = &credentials.password {
        key.add_password(password);
    }
    if let Some(path) = &credentials.key_file {
        let contents = std::fs::read(path)
            .with_context(|| format!("cannot read key file {}", path.display()))?;
        key.add_key_file_bytes(&contents);
    }
    if credentials.password.is_none() && credentials.key_file.is_none() {
        bail!("no credentials: pass --password, --key-file or set KDBX_PASSWORD");
    }
    Ok(key)
}

fn open(path: &Path, credentials: &Credentials) -> anyhow::Result<KdbxDatabase> {
    let key = composite_key(credentials)?;
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    KdbxDatabase::open(&mut BufReader::new(file), &key)
        .with_context(|| format!("cannot read {}", path.display()))
}

fn save(db: &mut KdbxDatabase, path: &Path, credentials: &Credentials) -> anyhow::Result<()> {
    let key = composite_key(credentials)?;
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    db.save(&mut BufWriter::new(file), &key)
        .with_context(|| format!("cannot write {}", path.display()))
}

fn info(path: &Path) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let header = KdbxDatabase::read_header(&mut BufReader::new(file))?;

    println!("Version:      KDBX {}", header.version());
    println!("Cipher:       {:?}", header.cipher());
    println!("Compression:  {:?}", header.compression());
    println!("KDF:          {}", header.kdf_name());
    match &header {
        KdbxHeader::Kdbx3(h) => {
            println!("Rounds:       {}", h.kdf.rounds);
            println!("Inner stream: {:?}", h.inner_stream);
        }
        KdbxHeader::Kdbx4(h) => {
            if let KdfParameters::Argon2(argon) = &h.kdf {
                println!("Iterations:   {}", argon.iterations);
                println!("Memory:       {} KiB", argon.memory / 1024);
                println!("Parallelism:  {}", argon.parallelism);
            }
            if let KdfParameters::Aes(aes) = &h.kdf {
                println!("Rounds:       {}", aes.rounds);
            }
        }
    }
    Ok(())
}

fn print_group(group: &KdbxGroup, depth: usize) {
    println!("{}{}/", "  ".repeat(depth), group.name);
    for entry in group.entries() {
        println!("{}{}", "  ".repeat(depth + 1), entry.title());
    }
    for sub in group.groups() {
        print_group(sub, depth + 1);
    }
}

fn show(path: &Path, title: &str, reveal: bool, credentials: &Credentials) -> anyhow::Result<()> {
    let db = open(path, credentials)?;
    let entry = db
        .root()
        .find_entry_by_title(title)
        .ok_or_else(|| anyhow!("no entry titled {:?}", title))?;

    println!("UUID: {}", entry.uuid);
    for (key, value) in entry.fields() {
        if value.is_protected() && !reveal {
            println!("{}: ********", key);
        } else {
            println!("{}: {}", key, value.as_str());
        }
    }
    for binary in entry.binaries() {
        let content = db.binary_content(binary)?;
        println!("Attachment {}: {} bytes", binary.name, content.len());
    }
    if !entry.history().is_empty() {
        println!("History: {} versions", entry.history().len());
    }
    Ok(())
}

fn create(
    path: &Path,
    format: u16,
    cipher: OuterCipherSuite,
    kdf: Option<&str>,
    credentials: &Credentials,
) -> anyhow::Result<()> {
    let base = match format {
        3 => DatabaseOptions::kdbx3(),
        4 => DatabaseOptions::default(),
        other => bail!("unsupported format {}", other),
    };
    let kdf = match (kdf.map(str::to_ascii_lowercase).as_deref(), base.version) {
        (None, _) | (Some("aes"), FormatVersion::Kdbx3) | (Some("argon2id"), FormatVersion::Kdbx4) => {
            base.kdf.clone()
        }
        (Some("aes"), FormatVersion::Kdbx4) => KdfParameters::Aes(AesKdf {
            id: AesKdfId::Kdbx4,
            ..AesKdf::new(60_000)
        }),
        (Some("argon2d"), FormatVersion::Kdbx4) => {
            KdfParameters::Argon2(Argon2Kdf::new(Argon2Type::Argon2d, 2, 64 * 1024 * 1024, 2))
        }
        (Some(other), version) => bail!("KDF {} is not available for {:?}", other, version),
    };

    let options = DatabaseOptions {
        cipher,
        kdf,
        ..base
    };
    let mut db = KdbxDatabase::new(options)?;
    save(&mut db, path, credentials)?;
    println!("Created {} (KDBX {})", path.display(), db.version());
    Ok(())
}
