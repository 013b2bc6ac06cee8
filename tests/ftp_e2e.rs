use anyhow::Result;
use ftpnav::{
    EntryKind, FtpTransport, ListingEntry, RemoteSession, SessionError, TransferError,
    TransportError,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn write_file(path: &Path, size: usize) -> Result<Vec<u8>> {
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let mut f = File::create(path)?;
    f.write_all(&data)?;
    Ok(data)
}

#[derive(Debug, Clone, Copy, Default)]
struct ServerOptions {
    /// Answer PASV with 502 so clients must use EPSV.
    refuse_pasv: bool,
    /// Never answer QUIT; keep the connection open until the client leaves.
    silent_quit: bool,
}

/// Minimal passive-mode FTP server rooted at a directory. Accepts demo/demo
/// and anonymous logins.
fn spawn_server(root: PathBuf) -> Result<u16> {
    spawn_server_with(root, ServerOptions::default())
}

fn spawn_server_with(root: PathBuf, options: ServerOptions) -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let root = root.clone();
            std::thread::spawn(move || {
                let _ = serve_control(stream, &root, options);
            });
        }
    });
    Ok(port)
}

fn reply(out: &mut TcpStream, line: &str) -> io::Result<()> {
    out.write_all(format!("{}\r\n", line).as_bytes())
}

fn dir_of(root: &Path, cwd: &[String]) -> PathBuf {
    cwd.iter().fold(root.to_path_buf(), |p, s| p.join(s))
}

fn listing(dir: &Path) -> io::Result<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .collect();
    names.sort_by_key(|e| e.file_name());
    let mut out = String::new();
    for entry in names {
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if meta.is_dir() {
            out.push_str(&format!("drwxr-xr-x 1 ftp ftp 0 Jan 01 00:00 {}\r\n", name));
        } else {
            out.push_str(&format!(
                "-rw-r--r-- 1 ftp ftp {} Jan 01 00:00 {}\r\n",
                meta.len(),
                name
            ));
        }
    }
    Ok(out)
}

fn serve_control(stream: TcpStream, root: &Path, options: ServerOptions) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    let mut cwd: Vec<String> = Vec::new();
    let mut user = String::new();
    let mut logged_in = false;
    let mut passive: Option<TcpListener> = None;

    reply(&mut out, "220-fake ftp")?;
    reply(&mut out, "220-anonymous and demo/demo welcome")?;
    reply(&mut out, "220 ready")?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        let here = dir_of(root, &cwd);

        match verb.as_str() {
            "USER" => {
                user = arg;
                reply(&mut out, "331 Password required")?;
            }
            "PASS" => {
                if (user == "demo" && arg == "demo") || user == "anonymous" {
                    logged_in = true;
                    reply(&mut out, "230 Logged in")?;
                } else {
                    reply(&mut out, "530 Login incorrect")?;
                }
            }
            "QUIT" if options.silent_quit => {
                let mut rest = String::new();
                while reader.read_line(&mut rest)? > 0 {
                    rest.clear();
                }
                return Ok(());
            }
            "QUIT" => {
                reply(&mut out, "221 Bye")?;
                return Ok(());
            }
            _ if !logged_in => reply(&mut out, "530 Not logged in")?,
            "TYPE" => {
                reply(&mut out, "200-Switching to binary")?;
                reply(&mut out, "   continuation without a code")?;
                reply(&mut out, "200 Type set")?;
            }
            "PWD" => reply(&mut out, "257 \"/\" is current directory")?,
            "CWD" => {
                let mut next = cwd.clone();
                match arg.as_str() {
                    "/" => next.clear(),
                    ".." => {
                        next.pop();
                    }
                    name => next.push(name.to_string()),
                }
                if dir_of(root, &next).is_dir() {
                    cwd = next;
                    reply(&mut out, "250 Directory changed")?;
                } else {
                    reply(&mut out, "550 No such directory")?;
                }
            }
            "PASV" if options.refuse_pasv => reply(&mut out, "502 Use EPSV")?,
            "EPSV" => {
                let l = TcpListener::bind("127.0.0.1:0")?;
                let p = l.local_addr()?.port();
                passive = Some(l);
                reply(&mut out, &format!("229 Entering Extended Passive Mode (|||{}|)", p))?;
            }
            "PASV" => {
                let l = TcpListener::bind("127.0.0.1:0")?;
                let p = l.local_addr()?.port();
                passive = Some(l);
                reply(
                    &mut out,
                    &format!("227 Entering Passive Mode (127,0,0,1,{},{})", p / 256, p % 256),
                )?;
            }
            "LIST" | "RETR" | "STOR" => {
                let Some(data_listener) = passive.take() else {
                    reply(&mut out, "425 Use PASV first")?;
                    continue;
                };
                if verb == "RETR" && !here.join(&arg).is_file() {
                    reply(&mut out, "550 No such file")?;
                    continue;
                }
                let (mut data, _) = data_listener.accept()?;
                reply(&mut out, "150 Opening data connection")?;
                match verb.as_str() {
                    "LIST" => data.write_all(listing(&here)?.as_bytes())?,
                    "RETR" => {
                        io::copy(&mut File::open(here.join(&arg))?, &mut data)?;
                    }
                    _ => {
                        io::copy(&mut data, &mut File::create(here.join(&arg))?)?;
                    }
                }
                drop(data);
                reply(&mut out, "226 Transfer complete")?;
            }
            "MKD" => match std::fs::create_dir(here.join(&arg)) {
                Ok(()) => reply(&mut out, &format!("257 \"{}\" created", arg))?,
                Err(_) => reply(&mut out, "550 Cannot create")?,
            },
            "RMD" => match std::fs::remove_dir(here.join(&arg)) {
                Ok(()) => reply(&mut out, "250 Removed")?,
                Err(_) => reply(&mut out, "550 Cannot remove")?,
            },
            "DELE" => match std::fs::remove_file(here.join(&arg)) {
                Ok(()) => reply(&mut out, "250 Deleted")?,
                Err(_) => reply(&mut out, "550 Cannot delete")?,
            },
            _ => reply(&mut out, "502 Command not implemented")?,
        }
    }
}

fn session(port: u16, userpass: &str) -> RemoteSession<FtpTransport> {
    let transport = FtpTransport::new().with_connect_timeout(Some(Duration::from_secs(5)));
    let mut s = RemoteSession::new(transport);
    s.connect(&format!("ftp://127.0.0.1:{}", port), userpass);
    s
}

#[test]
fn mkdir_upload_list_download_delete() -> Result<()> {
    let srv = tempfile::tempdir()?;
    let cli = tempfile::tempdir()?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "demo:demo");

    s.make_directory("docs")?;
    assert!(srv.path().join("docs").is_dir());
    s.change_directory("docs")?;

    let sent = write_file(&cli.path().join("a.bin"), 300_000)?;
    let up = s.upload(&cli.path().join("a.bin"), "a.bin")?;
    assert_eq!(up.value, sent.len() as u64);
    assert_eq!(std::fs::read(srv.path().join("docs/a.bin"))?, sent);

    let entries = s.list()?.value;
    assert_eq!(
        entries,
        vec![ListingEntry {
            name: "a.bin".into(),
            kind: EntryKind::File,
            size: sent.len() as u64,
        }]
    );

    let back = cli.path().join("back.bin");
    let down = s.download("a.bin", &back)?;
    assert_eq!(down.value, sent.len() as u64);
    assert_eq!(std::fs::read(&back)?, sent);

    s.delete_entry("a.bin", EntryKind::File)?;
    assert!(s.list()?.value.is_empty());

    s.change_directory("..")?;
    s.delete_entry("docs", EntryKind::Directory)?;
    assert!(!srv.path().join("docs").exists());
    assert!(s.transport().is_connected());
    Ok(())
}

#[test]
fn rejected_login_is_auth_error() -> Result<()> {
    let srv = tempfile::tempdir()?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "demo:wrong");

    match s.list() {
        Err(SessionError::Transfer {
            source: TransferError::Network(TransportError::Auth(_)),
            ..
        }) => {}
        other => panic!("expected auth failure, got {:?}", other),
    }
    assert!(!s.transport().is_connected());
    Ok(())
}

#[test]
fn missing_remote_file_leaves_no_local_file() -> Result<()> {
    let srv = tempfile::tempdir()?;
    let cli = tempfile::tempdir()?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "");

    let dest = cli.path().join("nope.bin");
    match s.download("nope.bin", &dest) {
        Err(SessionError::Transfer {
            source: TransferError::Network(TransportError::Protocol { code: 550, .. }),
            ..
        }) => {}
        other => panic!("expected 550, got {:?}", other),
    }
    assert!(!dest.exists());

    // A negative reply keeps the control connection usable.
    assert!(s.transport().is_connected());
    assert!(s.list()?.value.is_empty());
    Ok(())
}

#[test]
fn bad_directory_surfaces_on_next_listing() -> Result<()> {
    let srv = tempfile::tempdir()?;
    std::fs::create_dir(srv.path().join("pub"))?;
    std::fs::write(srv.path().join("pub/readme.txt"), b"hello")?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "");

    s.change_directory("missing")?;
    let err = s.list().unwrap_err();
    assert!(err.to_string().contains("550"), "{}", err);
    assert!(s.current_locator().ends_with("/missing/"));

    s.change_directory("..")?;
    s.change_directory("pub")?;
    let entries = s.list()?.value;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "readme.txt");
    assert_eq!(entries[0].size, 5);
    Ok(())
}

#[test]
fn percent_in_names_is_kept_literally() -> Result<()> {
    let srv = tempfile::tempdir()?;
    let cli = tempfile::tempdir()?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "demo:demo");

    let sent = write_file(&cli.path().join("deal.txt"), 64)?;
    s.make_directory("100% sure")?;
    s.change_directory("100% sure")?;
    s.upload(&cli.path().join("deal.txt"), "50%41off.txt")?;

    let stored = srv.path().join("100% sure").join("50%41off.txt");
    assert_eq!(std::fs::read(&stored)?, sent);
    let names: Vec<_> = s.list()?.value.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["50%41off.txt".to_string()]);

    let back = cli.path().join("back.txt");
    s.download("50%41off.txt", &back)?;
    assert_eq!(std::fs::read(&back)?, sent);
    Ok(())
}

#[test]
fn line_breaks_in_names_never_reach_the_server() -> Result<()> {
    let srv = tempfile::tempdir()?;
    std::fs::write(srv.path().join("victim.txt"), b"keep me")?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "demo:demo");

    let err = s.make_directory("a\r\nDELE victim.txt").unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transfer {
            source: TransferError::Network(TransportError::Connection(_)),
            ..
        }
    ));
    s.change_directory("x\r\nDELE victim.txt")?;
    assert!(s.list().is_err());
    assert!(srv.path().join("victim.txt").exists());

    // Escapes typed by the user are a literal part of the name.
    s.change_directory("/")?;
    s.make_directory("a%0D%0ADELE%20victim.txt")?;
    assert!(srv.path().join("a%0D%0ADELE%20victim.txt").is_dir());
    assert!(srv.path().join("victim.txt").exists());
    assert_eq!(s.list()?.value.len(), 2);
    Ok(())
}

#[test]
fn slash_as_a_name_touches_nothing() -> Result<()> {
    let srv = tempfile::tempdir()?;
    std::fs::create_dir(srv.path().join("docs"))?;
    let port = spawn_server(srv.path().to_path_buf())?;
    let mut s = session(port, "demo:demo");

    s.change_directory("docs")?;
    assert!(matches!(
        s.delete_entry("/", EntryKind::Directory),
        Err(SessionError::InvalidName(_))
    ));
    assert!(srv.path().join("docs").is_dir());

    s.make_directory("/top")?;
    assert!(srv.path().join("top").is_dir());
    assert!(!srv.path().join("docs/top").exists());
    Ok(())
}

#[test]
fn epsv_fallback_and_multiline_replies() -> Result<()> {
    let srv = tempfile::tempdir()?;
    let cli = tempfile::tempdir()?;
    let options = ServerOptions {
        refuse_pasv: true,
        ..Default::default()
    };
    let port = spawn_server_with(srv.path().to_path_buf(), options)?;
    let mut s = session(port, "demo:demo");

    let sent = write_file(&cli.path().join("e.bin"), 70_000)?;
    assert_eq!(s.upload(&cli.path().join("e.bin"), "e.bin")?.value, sent.len() as u64);
    assert_eq!(s.list()?.value.len(), 1);
    let back = cli.path().join("back.bin");
    s.download("e.bin", &back)?;
    assert_eq!(std::fs::read(&back)?, sent);
    Ok(())
}

#[test]
fn unanswered_quit_does_not_block_drop() -> Result<()> {
    let srv = tempfile::tempdir()?;
    let options = ServerOptions {
        silent_quit: true,
        ..Default::default()
    };
    let port = spawn_server_with(srv.path().to_path_buf(), options)?;
    let mut s = session(port, "");
    assert!(s.list()?.value.is_empty());
    assert!(s.transport().is_connected());

    let started = Instant::now();
    drop(s);
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}
