//! Interactive command line parsing

use crate::listing::EntryKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { url: String, userpass: String },
    List,
    Cd(String),
    Mkdir(String),
    Rm { name: String, kind: EntryKind },
    Get { remote: String, local: String },
    Put { local: String, remote: String },
    Pwd,
    LocalList,
    LocalCd(String),
    LocalMkdir(String),
    LocalRm(String),
    LocalMv { from: String, to: String },
    Help,
    Exit,
    /// Known verb with the wrong arguments; carries the usage line.
    Usage(&'static str),
    Unknown(String),
}

pub const HELP: &str = "\
Remote commands (FTP):
  connect <url> [user:password]  Set the server URL
                                 (e.g. connect ftp://demo.wftpserver.com demo:demo)
  ls | dir                       List the remote directory
  cd <dir>                       Change remote directory (.. goes up)
  pwd                            Show the current remote URL
  mkdir <dir>                    Create a remote directory
  rm <name> <is_dir>             Delete a remote file or directory (is_dir: 0|1|true|false|file|dir)
  get <remote> [local]           Download a file
  put <local> [remote]           Upload a file
Local commands:
  lls | ldir                     List the local directory
  lcd <dir>                      Change local directory
  lmkdir <dir>                   Create a local directory
  lrm <path>                     Remove a local file or empty directory
  lmv <from> <to>                Move or rename a local file or directory
General:
  help                           Show this help
  exit | quit                    Leave";

mod usage {
    pub const CONNECT: &str = "usage: connect <url> [user:password]";
    pub const CD: &str = "usage: cd <dir>";
    pub const MKDIR: &str = "usage: mkdir <dir>";
    pub const RM: &str = "usage: rm <name> <is_dir: 0|1>";
    pub const GET: &str = "usage: get <remote> [local]";
    pub const PUT: &str = "usage: put <local> [remote]";
    pub const LCD: &str = "usage: lcd <dir>";
    pub const LMKDIR: &str = "usage: lmkdir <dir>";
    pub const LRM: &str = "usage: lrm <path>";
    pub const LMV: &str = "usage: lmv <from> <to>";
}

fn parse_kind(flag: &str) -> Option<EntryKind> {
    match flag.to_ascii_lowercase().as_str() {
        "1" | "true" | "dir" | "d" => Some(EntryKind::Directory),
        "0" | "false" | "file" | "f" => Some(EntryKind::File),
        _ => None,
    }
}

/// Base name of a path-ish argument, used when the second name is omitted.
fn base_name(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Parse one input line. `None` for a blank line.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?.to_ascii_lowercase();
    let args: Vec<String> = parts.map(str::to_string).collect();
    let arity = |n: usize, usage: &'static str| -> Result<(), Command> {
        if args.len() == n {
            Ok(())
        } else {
            Err(Command::Usage(usage))
        }
    };

    let cmd = match verb.as_str() {
        "exit" | "quit" => Command::Exit,
        "help" | "?" => Command::Help,
        "connect" | "open" => match args.as_slice() {
            [url] => Command::Connect {
                url: url.clone(),
                userpass: String::new(),
            },
            [url, userpass] => Command::Connect {
                url: url.clone(),
                userpass: userpass.clone(),
            },
            _ => Command::Usage(usage::CONNECT),
        },
        "ls" | "dir" => Command::List,
        "pwd" => Command::Pwd,
        "cd" => match arity(1, usage::CD) {
            Ok(()) => Command::Cd(args[0].clone()),
            Err(u) => u,
        },
        "mkdir" => match arity(1, usage::MKDIR) {
            Ok(()) => Command::Mkdir(args[0].clone()),
            Err(u) => u,
        },
        "rm" => match args.as_slice() {
            [name, flag] => match parse_kind(flag) {
                Some(kind) => Command::Rm {
                    name: name.clone(),
                    kind,
                },
                None => Command::Usage(usage::RM),
            },
            _ => Command::Usage(usage::RM),
        },
        "get" => match args.as_slice() {
            [remote] => Command::Get {
                local: base_name(remote),
                remote: remote.clone(),
            },
            [remote, local] => Command::Get {
                remote: remote.clone(),
                local: local.clone(),
            },
            _ => Command::Usage(usage::GET),
        },
        "put" => match args.as_slice() {
            [local] => Command::Put {
                remote: base_name(local),
                local: local.clone(),
            },
            [local, remote] => Command::Put {
                local: local.clone(),
                remote: remote.clone(),
            },
            _ => Command::Usage(usage::PUT),
        },
        "lls" | "ldir" => Command::LocalList,
        "lcd" => match arity(1, usage::LCD) {
            Ok(()) => Command::LocalCd(args[0].clone()),
            Err(u) => u,
        },
        "lmkdir" => match arity(1, usage::LMKDIR) {
            Ok(()) => Command::LocalMkdir(args[0].clone()),
            Err(u) => u,
        },
        "lrm" => match arity(1, usage::LRM) {
            Ok(()) => Command::LocalRm(args[0].clone()),
            Err(u) => u,
        },
        "lmv" => match arity(2, usage::LMV) {
            Ok(()) => Command::LocalMv {
                from: args[0].clone(),
                to: args[1].clone(),
            },
            Err(u) => u,
        },
        _ => Command::Unknown(verb),
    };
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(line: &str) -> Command {
        parse_command(line).unwrap()
    }

    #[test]
    fn blank_line_is_none() {
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn connect_with_and_without_credential() {
        assert_eq!(
            p("CONNECT ftp://h demo:demo"),
            Command::Connect {
                url: "ftp://h".into(),
                userpass: "demo:demo".into()
            }
        );
        assert_eq!(
            p("connect ftp://h"),
            Command::Connect {
                url: "ftp://h".into(),
                userpass: String::new()
            }
        );
        assert_eq!(p("connect"), Command::Usage(usage::CONNECT));
    }

    #[test]
    fn rm_flag_variants() {
        assert_eq!(
            p("rm old 1"),
            Command::Rm {
                name: "old".into(),
                kind: EntryKind::Directory
            }
        );
        assert_eq!(
            p("rm a.txt false"),
            Command::Rm {
                name: "a.txt".into(),
                kind: EntryKind::File
            }
        );
        assert_eq!(p("rm a.txt"), Command::Usage(usage::RM));
        assert_eq!(p("rm a.txt maybe"), Command::Usage(usage::RM));
    }

    #[test]
    fn get_put_default_names() {
        assert_eq!(
            p("get docs/report.pdf"),
            Command::Get {
                remote: "docs/report.pdf".into(),
                local: "report.pdf".into()
            }
        );
        assert_eq!(
            p("put /tmp/x.bin"),
            Command::Put {
                local: "/tmp/x.bin".into(),
                remote: "x.bin".into()
            }
        );
    }

    #[test]
    fn arity_and_unknown() {
        assert_eq!(p("cd"), Command::Usage(usage::CD));
        assert_eq!(p("cd a b"), Command::Usage(usage::CD));
        assert_eq!(p("Ls"), Command::List);
        assert_eq!(
            p("lmv a b"),
            Command::LocalMv {
                from: "a".into(),
                to: "b".into()
            }
        );
        assert_eq!(p("frobnicate"), Command::Unknown("frobnicate".into()));
    }
}
