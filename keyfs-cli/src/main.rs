//! Thin shell over the `FS.*` command family. All storage logic lives in
//! `keyfs` / `keyfs-cmd`; this binary only tokenizes input, dispatches and
//! renders replies, and moves keyspace images to and from disk.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use structopt::StructOpt;

use git_version::git_version;

use keyfs::dev::std_impl::StdTimeProvider;
use keyfs_cmd::{dispatch, Keyspace, Propagate, Reply, DATATYPE};

const IMAGE_MAGIC: &[u8; 8] = b"KEYFSIMG";

#[derive(Debug, StructOpt)]
#[structopt(about = "Shell for keyfs filesystem keys.")]
enum Opt {
    /// Interactive command loop over a keyspace.
    #[structopt(name = "repl")]
    Repl {
        /// Keyspace image to load on start and write back on exit.
        #[structopt(short = "i", long = "image", parse(from_os_str))]
        image: Option<PathBuf>,
    },

    /// Run one command and print its reply.
    #[structopt(name = "exec")]
    Exec {
        /// Keyspace image to load first and write back after a write.
        #[structopt(short = "i", long = "image", parse(from_os_str))]
        image: Option<PathBuf>,

        /// Command words, e.g. `FS.ECHO k /motd hello`
        args: Vec<String>,
    },

    #[structopt(name = "git-version")]
    GitVersion,
}

static TIME: StdTimeProvider = StdTimeProvider;

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    match opt {
        Opt::Repl { image } => {
            let mut ks = open_keyspace(image.as_deref());
            let dirty = repl(&mut ks);
            if dirty {
                if let Some(path) = image.as_deref() {
                    save_image(&ks, path).expect("failed to write image");
                }
            }
        }
        Opt::Exec { image, args } => {
            let mut ks = open_keyspace(image.as_deref());
            let argv: Vec<Vec<u8>> = args.into_iter().map(String::into_bytes).collect();
            let (reply, propagate) = dispatch(&mut ks, &argv);
            print_reply(&reply, 0);
            if propagate == Propagate::Verbatim {
                if let Some(path) = image.as_deref() {
                    save_image(&ks, path).expect("failed to write image");
                }
            }
        }
        Opt::GitVersion => {
            println!("{}", git_version!(fallback = "unknown"));
        }
    }
}

fn repl(ks: &mut Keyspace) -> bool {
    let stdin = io::stdin();
    let mut dirty = false;
    loop {
        print!("keyfs> ");
        io::stdout().flush().expect("failed to flush prompt");
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("(error) {}", err);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        match tokenize(line) {
            Some(argv) if !argv.is_empty() => {
                let (reply, propagate) = dispatch(ks, &argv);
                if propagate == Propagate::Verbatim {
                    dirty = true;
                }
                print_reply(&reply, 0);
            }
            _ => eprintln!("(error) unbalanced quotes"),
        }
    }
    dirty
}

/// Split a line into command words: whitespace separates, double quotes
/// group, and `\n` `\t` `\r` `\0` `\xNN` `\\` `\"` escape inside quotes.
fn tokenize(line: &str) -> Option<Vec<Vec<u8>>> {
    let bytes = line.as_bytes();
    let mut words = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let mut word = Vec::new();
        if bytes[i] == b'"' {
            i += 1;
            loop {
                if i >= bytes.len() {
                    return None;
                }
                match bytes[i] {
                    b'"' => {
                        i += 1;
                        break;
                    }
                    b'\\' if i + 1 < bytes.len() => {
                        i += 1;
                        match bytes[i] {
                            b'n' => word.push(b'\n'),
                            b't' => word.push(b'\t'),
                            b'r' => word.push(b'\r'),
                            b'0' => word.push(0),
                            b'x' if i + 2 < bytes.len() => {
                                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
                                word.push(u8::from_str_radix(hex, 16).ok()?);
                                i += 2;
                            }
                            other => word.push(other),
                        }
                        i += 1;
                    }
                    other => {
                        word.push(other);
                        i += 1;
                    }
                }
            }
        } else {
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                word.push(bytes[i]);
                i += 1;
            }
        }
        words.push(word);
    }
    Some(words)
}

fn print_reply(reply: &Reply, indent: usize) {
    let pad = "  ".repeat(indent);
    match reply {
        Reply::Ok => println!("{}OK", pad),
        Reply::Int(v) => println!("{}(integer) {}", pad, v),
        Reply::Bulk(bytes) => println!("{}\"{}\"", pad, printable(bytes)),
        Reply::Null => println!("{}(nil)", pad),
        Reply::Error(err) => println!("{}(error) {}", pad, err),
        Reply::Array(items) => {
            if items.is_empty() {
                println!("{}(empty array)", pad);
            }
            for item in items {
                print_reply(item, indent + 1);
            }
        }
        Reply::Map(fields) => {
            for (name, value) in fields {
                match value {
                    Reply::Int(v) => println!("{}{}: {}", pad, name, v),
                    Reply::Bulk(bytes) => println!("{}{}: {}", pad, name, printable(bytes)),
                    other => print_reply(other, indent + 1),
                }
            }
        }
    }
}

fn printable(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'"' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            other => out.push_str(&format!("\\x{:02x}", other)),
        }
    }
    out
}

/// Open or create the keyspace behind an optional image file.
fn open_keyspace(image: Option<&Path>) -> Keyspace {
    let mut ks = Keyspace::new(&TIME);
    if let Some(path) = image {
        if path.exists() {
            load_image(&mut ks, path).expect("failed to read image");
            info!("loaded {} keys from {}", ks.len(), path.display());
        }
    }
    ks
}

fn load_image(ks: &mut Keyspace, path: &Path) -> io::Result<()> {
    let mut file = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != IMAGE_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a keyfs image"));
    }
    let mut word = [0u8; 4];
    file.read_exact(&mut word)?;
    let version = u32::from_le_bytes(word);
    let mut quad = [0u8; 8];
    file.read_exact(&mut quad)?;
    let count = u64::from_le_bytes(quad);
    for _ in 0..count {
        file.read_exact(&mut quad)?;
        let mut key = vec![0u8; u64::from_le_bytes(quad) as usize];
        file.read_exact(&mut key)?;
        let fs = (DATATYPE.load)(&mut file, version)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", err)))?;
        ks.insert(key, fs);
    }
    Ok(())
}

fn save_image(ks: &Keyspace, path: &Path) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(IMAGE_MAGIC)?;
    file.write_all(&DATATYPE.encoding_version.to_le_bytes())?;
    file.write_all(&(ks.len() as u64).to_le_bytes())?;
    for (key, fs) in ks.iter() {
        file.write_all(&(key.len() as u64).to_le_bytes())?;
        file.write_all(key)?;
        (DATATYPE.save)(fs, &mut file)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "snapshot write failed"))?;
    }
    file.flush()
}
