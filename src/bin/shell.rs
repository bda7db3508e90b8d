//! Interactive shell over the disk image file system. Grounded in the
//! teacher's `fat32-fs-std` example binary: `clap` argument parsing, a
//! `lazy_static` prompt, and a `loop { print prompt; read line; match }`
//! command dispatcher.

use std::collections::{HashMap, HashSet};
use std::io::{stdin, stdout, Write};
use std::sync::RwLock;

use clap::Parser;
use lazy_static::lazy_static;
use log::error;

use osemu::error::Error;
use osemu::file::WriteMode;
use osemu::fs::Filesystem;

#[derive(Parser, Debug)]
#[command(name = "osemu-shell", about = "Disk image file system shell")]
struct Args {
    /// Path to the backing image file.
    #[arg(long, default_value = "fs.img")]
    disk: String,

    /// Disk size in GiB, used only when formatting a new image.
    #[arg(long, default_value_t = 1)]
    disk_size_gib: u64,
}

/// Failed logins allowed per account before it locks out for the rest of
/// the session.
const MAX_LOGIN_ATTEMPTS: u32 = 3;

struct Session {
    uid: u8,
    gid: u8,
    login: String,
    failed_attempts: HashMap<String, u32>,
    locked_accounts: HashSet<String>,
}

lazy_static! {
    static ref PROMPT_USER: RwLock<String> = RwLock::new("root".to_string());
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let fs = match Filesystem::open_or_format(&args.disk, args.disk_size_gib) {
        Ok(fs) => fs,
        Err(err) => {
            eprintln!("failed to open {:?}: {err}", args.disk);
            std::process::exit(1);
        }
    };

    let mut session = Session {
        uid: 0,
        gid: 0,
        login: "root".to_string(),
        failed_attempts: HashMap::new(),
        locked_accounts: HashSet::new(),
    };

    if fs.identity().is_first_run().unwrap_or(true) {
        println!("first run: set the root password before anything else works.");
        loop {
            let password = prompt_line("new root password: ");
            if password.is_empty() {
                println!("password must not be empty");
                continue;
            }
            if let Err(err) = fs.identity().set_password("root", &password) {
                println!("error: {err}");
                continue;
            }
            break;
        }
    }

    loop {
        *PROMPT_USER.write().unwrap() = session.login.clone();
        print!("{}@osemu:/ $ ", PROMPT_USER.read().unwrap());
        stdout().flush().ok();

        let mut input = String::new();
        if stdin().read_line(&mut input).unwrap_or(0) == 0 {
            break;
        }
        let mut tokens = input.trim().split_whitespace();
        let Some(cmd) = tokens.next() else { continue };
        let rest: Vec<&str> = tokens.collect();

        let result = dispatch(&fs, &mut session, cmd, &rest);
        if let Err(err) = result {
            error!("{cmd} failed: {err}");
            println!("error: {err}");
        }
        if cmd == "exit" {
            break;
        }
    }
}

fn prompt_line(label: &str) -> String {
    print!("{label}");
    stdout().flush().ok();
    let mut line = String::new();
    stdin().read_line(&mut line).ok();
    line.trim().to_string()
}

fn dispatch(
    fs: &Filesystem,
    session: &mut Session,
    cmd: &str,
    args: &[&str],
) -> osemu::error::Result<()> {
    match cmd {
        "ls" => {
            for record in fs.list()? {
                println!(
                    "{:<40} {:>8} {:o} uid={} gid={}",
                    record.name(),
                    record.size,
                    record.perms,
                    record.uid,
                    record.gid
                );
            }
            Ok(())
        }
        "touch" => {
            let name = args.first().ok_or_else(|| Error::InvalidArg("usage: touch <name>".into()))?;
            fs.create(name, session.uid, session.gid)?;
            Ok(())
        }
        "cat" => {
            let name = args.first().ok_or_else(|| Error::InvalidArg("usage: cat <name>".into()))?;
            let bytes = fs.read_checked(name, session.uid, session.gid)?;
            stdout().write_all(&bytes).ok();
            println!();
            Ok(())
        }
        "echo" => echo(fs, session, args),
        "rm" => {
            let name = args.first().ok_or_else(|| Error::InvalidArg("usage: rm <name>".into()))?;
            fs.delete_checked(name, session.uid, session.gid)
        }
        "chmod" => {
            let mode = args.first().ok_or_else(|| Error::InvalidArg("usage: chmod <mode> <name>".into()))?;
            let name = args.get(1).ok_or_else(|| Error::InvalidArg("usage: chmod <mode> <name>".into()))?;
            let mode = u16::from_str_radix(mode, 8).map_err(|_| Error::BadMode((*mode).to_string()))?;
            fs.chmod_checked(name, mode, session.uid, session.gid)
        }
        "chown" => {
            let uid = args.first().ok_or_else(|| Error::InvalidArg("usage: chown <uid> <gid> <name>".into()))?;
            let gid = args.get(1).ok_or_else(|| Error::InvalidArg("usage: chown <uid> <gid> <name>".into()))?;
            let name = args.get(2).ok_or_else(|| Error::InvalidArg("usage: chown <uid> <gid> <name>".into()))?;
            let uid: u8 = uid.parse().map_err(|_| Error::InvalidArg("bad uid".into()))?;
            let gid: u8 = gid.parse().map_err(|_| Error::InvalidArg("bad gid".into()))?;
            fs.chown_checked(name, uid, gid, session.uid)
        }
        "df" => {
            let free = fs.free_cluster_count()?;
            println!("{free} free clusters of {} total", fs.total_clusters());
            Ok(())
        }
        "whoami" => {
            println!("{} (uid={} gid={})", session.login, session.uid, session.gid);
            Ok(())
        }
        "passwd" => {
            let password = prompt_line("new password: ");
            fs.identity().set_password(&session.login, &password)
        }
        "useradd" => {
            if session.uid != 0 {
                return Err(Error::PermissionDenied("only root may add users".into()));
            }
            let login = args.first().ok_or_else(|| Error::InvalidArg("usage: useradd <login>".into()))?;
            let password = prompt_line("password for new user: ");
            fs.identity().add_user(login, &password, None, 100)?;
            Ok(())
        }
        "users" => {
            for user in fs.identity().regular_users()? {
                println!("{} (uid={})", user.login, user.uid);
            }
            Ok(())
        }
        "login" => {
            let login = args.first().ok_or_else(|| Error::InvalidArg("usage: login <name>".into()))?;
            if session.locked_accounts.contains(*login) {
                return Err(Error::AuthLocked);
            }
            let password = prompt_line("password: ");
            if fs.identity().verify_password(login, &password)? {
                session.failed_attempts.remove(*login);
                let user = fs.identity().user(login)?.expect("just verified");
                session.uid = user.uid;
                session.gid = user.gid;
                session.login = user.login;
                Ok(())
            } else {
                let attempts = session.failed_attempts.entry(login.to_string()).or_insert(0);
                *attempts += 1;
                if *attempts >= MAX_LOGIN_ATTEMPTS {
                    session.locked_accounts.insert(login.to_string());
                    Err(Error::AuthLocked)
                } else {
                    Err(Error::AuthFailed)
                }
            }
        }
        "exit" => {
            fs.sync().map_err(Error::from)
        }
        "help" => {
            println!("ls touch cat echo rm chmod chown df whoami passwd useradd users login exit help");
            Ok(())
        }
        other => Err(Error::InvalidArg(format!("unknown command {other:?}"))),
    }
}

/// `echo a b c > name` / `echo a b c >> name`. All tokens before the
/// redirect are joined with single spaces before writing.
fn echo(fs: &Filesystem, session: &mut Session, args: &[&str]) -> osemu::error::Result<()> {
    let redirect_pos = args
        .iter()
        .position(|&tok| tok == ">" || tok == ">>")
        .ok_or_else(|| Error::InvalidArg("usage: echo <text...> > <name>".into()))?;
    let append = args[redirect_pos] == ">>";
    let content = args[..redirect_pos].join(" ");
    let name = args
        .get(redirect_pos + 1)
        .ok_or_else(|| Error::InvalidArg("missing redirect target".into()))?;

    let mode = if append {
        WriteMode::Append
    } else {
        WriteMode::Replace
    };
    fs.write_checked(name, content.as_bytes(), mode, session.uid, session.gid)
}
