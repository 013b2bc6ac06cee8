//! ftpnav - interactive FTP navigator
//!
//! Reads one command per line, runs it to completion, prints the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ftpnav::cli::Opts;
use ftpnav::commands::{parse_command, Command, HELP};
use ftpnav::config::{self, Config};
use ftpnav::format::{render_listing, Row};
use ftpnav::journal::TransferJournal;
use ftpnav::local::{LocalMirror, StdFs};
use ftpnav::logger::{Logger, NoopLogger, TextLogger};
use ftpnav::{FtpTransport, RemoteSession};

struct App {
    session: RemoteSession<FtpTransport>,
    mirror: LocalMirror<StdFs>,
    config: Config,
    config_path: PathBuf,
    progress: bool,
    color: bool,
}

impl App {
    fn prompt(&self) -> String {
        let local = self
            .mirror
            .current()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.mirror.current().display().to_string());
        let remote = self
            .session
            .locator()
            .map(|l| l.last_segment().to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("\nlocal:{} | remote:{}> ", local, remote)
    }

    fn connect(&mut self, url: &str, userpass: &str) {
        let report = self.session.connect(url, userpass);
        println!("{}", report.detail);
        self.config.add_recent_host(url);
        if let Err(e) = self.config.save(&self.config_path) {
            eprintln!("Warning: could not save settings: {:#}", e);
        }
    }

    fn spinner(&self, label: &str) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    fn local_path(&self, path: &str) -> PathBuf {
        self.mirror.fs().resolve(Path::new(path))
    }

    /// Run one command; `false` ends the loop.
    fn dispatch(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Exit => return false,
            Command::Help => println!("{}", HELP),
            Command::Usage(text) => println!("{}", text),
            Command::Unknown(verb) => {
                println!("Unknown command '{}'. Type 'help' for a list of commands.", verb)
            }
            Command::Connect { url, userpass } => self.connect(&url, &userpass),
            Command::Pwd => match self.session.locator() {
                Some(l) => println!("{}", l),
                None => println!("(not connected)"),
            },
            Command::List => match self.session.list() {
                Ok(report) => {
                    let title = self.session.current_locator().to_string();
                    print!(
                        "{}",
                        render_listing(&title, report.value.iter().map(Row::from), self.color)
                    );
                }
                Err(e) => eprintln!("{}", e),
            },
            Command::Cd(dir) => report(self.session.change_directory(&dir)),
            Command::Mkdir(dir) => report(self.session.make_directory(&dir)),
            Command::Rm { name, kind } => report(self.session.delete_entry(&name, kind)),
            Command::Get { remote, local } => {
                let dest = self.local_path(&local);
                let pb = self.spinner(&format!("get {}", remote));
                let result = self.session.download_with(&remote, &dest, pb.as_ref());
                if let Some(pb) = pb {
                    pb.finish_and_clear();
                }
                report(result);
            }
            Command::Put { local, remote } => {
                let src = self.local_path(&local);
                let pb = self.spinner(&format!("put {}", local));
                let result = self.session.upload_with(&src, &remote, pb.as_ref());
                if let Some(pb) = pb {
                    pb.finish_and_clear();
                }
                report(result);
            }
            Command::LocalList => match self.mirror.list() {
                Ok(r) => {
                    let title = self.mirror.current().display().to_string();
                    print!(
                        "{}",
                        render_listing(&title, r.value.iter().map(Row::from), self.color)
                    );
                }
                Err(e) => eprintln!("{}", e),
            },
            Command::LocalCd(dir) => report(self.mirror.change_directory(&dir)),
            Command::LocalMkdir(dir) => report(self.mirror.make_directory(&dir)),
            Command::LocalRm(path) => report(self.mirror.remove(&path)),
            Command::LocalMv { from, to } => report(self.mirror.rename(&from, &to)),
        }
        true
    }
}

fn report<T, E: std::fmt::Display>(outcome: Result<ftpnav::Report<T>, E>) {
    match outcome {
        Ok(r) => println!("{}", r.detail),
        Err(e) => eprintln!("{}", e),
    }
}

fn main() -> Result<()> {
    // Transfers cannot be cancelled mid-flight; Ctrl-C leaves the program.
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let opts = Opts::parse();
    let config_path = opts
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = Config::load(&config_path)?;

    let log_file = opts.log_file.clone().or_else(|| config.log_file.clone());
    let logger: Arc<dyn Logger> = match log_file {
        Some(ref p) => match TextLogger::open(p) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                eprintln!("Warning: log file {} unavailable: {:#}", p.display(), e);
                Arc::new(NoopLogger)
            }
        },
        None => Arc::new(NoopLogger),
    };
    let journal = opts
        .journal
        .clone()
        .or_else(|| config.journal.clone())
        .map(TransferJournal::new);
    let format = opts.format.unwrap_or(config.listing_format);

    let transport = FtpTransport::new().with_connect_timeout(config.connect_timeout());
    let session = RemoteSession::new(transport)
        .with_logger(logger)
        .with_journal(journal)
        .with_format(format);
    let cwd = StdFs::from_process().context("Failed to read current directory")?;
    let mirror = LocalMirror::new(cwd);

    let mut app = App {
        session,
        mirror,
        progress: config.progress && !opts.no_progress,
        color: config.color && !opts.no_color,
        config,
        config_path,
    };

    println!(
        "ftpnav {} - interactive FTP client and local file manager. Type 'help' for commands.",
        env!("CARGO_PKG_VERSION")
    );
    let startup = opts.url.clone().or_else(|| app.config.default_url.clone());
    if let Some(url) = startup {
        app.connect(&url, opts.user.as_deref().unwrap_or(""));
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", app.prompt());
        io::stdout().flush().ok();
        let line = match lines.next() {
            Some(line) => line.context("Failed to read command")?,
            None => break,
        };
        let Some(cmd) = parse_command(&line) else {
            continue;
        };
        if !app.dispatch(cmd) {
            break;
        }
    }
    Ok(())
}
