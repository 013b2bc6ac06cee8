//! FTP transport over blocking `std::net` sockets
//!
//! One control connection is opened lazily on the first round trip and kept
//! for later calls to the same endpoint and login. Any failure other than a
//! plain negative reply drops it, so the next call starts from a clean login.
//! Data always flows over a passive connection to the control host.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::locator::Credential;
use crate::transport::{Command, Payload, Request, Transport, TransportError};

pub const DEFAULT_PORT: u16 = 21;
const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";
const DATA_CHUNK: usize = 64 * 1024;
/// How long `QUIT` waits for its reply before the socket is dropped anyway.
const QUIT_WAIT: Duration = Duration::from_millis(500);

/// Reply codes the client cares about.
mod code {
    pub const SERVICE_READY_SOON: u16 = 120;
    pub const SERVICE_READY: u16 = 220;
    pub const LOGGED_IN: u16 = 230;
    pub const NEED_PASSWORD: u16 = 331;
    pub const PATH_CREATED: u16 = 257;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    fn into_error(self) -> TransportError {
        TransportError::Protocol {
            code: self.code,
            message: self.text,
        }
    }
}

/// Who to log in as, where.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    user: String,
    password: String,
}

/// Parsed target of one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    endpoint: Endpoint,
    /// Decoded directory segments below the login directory.
    dirs: Vec<String>,
    /// Final segment when the locator does not end in `/`.
    name: Option<String>,
}

impl Target {
    /// Split `ftp://[user[:pass]@]host[:port]/a/b/[name]`, decoding every step.
    fn parse(locator: &str, credential: Option<&Credential>) -> Result<Self, TransportError> {
        let bad = |why: &str| TransportError::Connection(format!("{}: {}", why, locator));
        let url = Url::parse(locator).map_err(|e| bad(&e.to_string()))?;
        if url.scheme() != "ftp" {
            return Err(bad("unsupported scheme"));
        }
        let host = match url.host() {
            Some(Host::Domain(name)) => name.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(bad("missing host")),
        };
        let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);

        let (user, password) = match credential {
            Some(c) => (c.user.clone(), c.password.clone()),
            None if !url.username().is_empty() => (
                decode_segment(url.username())?,
                decode_segment(url.password().unwrap_or(""))?,
            ),
            None => (ANONYMOUS_USER.to_string(), ANONYMOUS_PASSWORD.to_string()),
        };
        check_line(&user)?;
        check_line(&password)?;

        let path = url.path().trim_start_matches('/');
        let mut dirs = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect::<Result<Vec<_>, _>>()?;
        let name = if path.is_empty() || path.ends_with('/') {
            None
        } else {
            dirs.pop()
        };

        Ok(Self {
            endpoint: Endpoint {
                host,
                port,
                user,
                password,
            },
            dirs,
            name,
        })
    }

    /// Name argument for file-level and administrative verbs. A locator that
    /// ends in `/` names its last directory segment.
    fn take_name(&mut self) -> Result<String, TransportError> {
        self.name
            .take()
            .or_else(|| self.dirs.pop())
            .ok_or_else(|| {
                TransportError::Connection("URL does not name a file or directory".into())
            })
    }
}

/// Percent-decode one path step or userinfo part.
fn decode_segment(segment: &str) -> Result<String, TransportError> {
    let decoded = percent_decode_str(segment).decode_utf8_lossy().into_owned();
    check_line(&decoded)?;
    Ok(decoded)
}

/// Anything sent as a command argument must stay on one control line.
fn check_line(value: &str) -> Result<(), TransportError> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(TransportError::Connection(format!(
            "line break or NUL in {:?}",
            value
        )));
    }
    Ok(())
}

fn connection_error(context: &str, e: io::Error) -> TransportError {
    TransportError::Connection(format!("{}: {}", context, e))
}

fn open_stream(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<TcpStream, TransportError> {
    let addr = format!("{}:{}", host, port);
    let stream = match timeout {
        None => TcpStream::connect((host, port)).map_err(|e| connection_error(&addr, e))?,
        Some(t) => {
            let mut last = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
            let mut found = None;
            for sa in (host, port)
                .to_socket_addrs()
                .map_err(|e| connection_error(&addr, e))?
            {
                match TcpStream::connect_timeout(&sa, t) {
                    Ok(s) => {
                        found = Some(s);
                        break;
                    }
                    Err(e) => last = e,
                }
            }
            found.ok_or_else(|| connection_error(&addr, last))?
        }
    };
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Logged-in control connection.
struct Control {
    endpoint: Endpoint,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// Directory the server put us in after login.
    home: String,
}

impl Control {
    fn open(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let stream = open_stream(&endpoint.host, endpoint.port, timeout)?;
        let writer = stream
            .try_clone()
            .map_err(|e| connection_error("control socket", e))?;
        let mut control = Self {
            endpoint: endpoint.clone(),
            reader: BufReader::new(stream),
            writer,
            home: "/".to_string(),
        };

        let mut greeting = control.read_reply()?;
        while greeting.code == code::SERVICE_READY_SOON {
            greeting = control.read_reply()?;
        }
        if greeting.code != code::SERVICE_READY {
            return Err(greeting.into_error());
        }
        control.login()?;
        control.expect_completion("TYPE I")?;
        let pwd = control.command("PWD")?;
        if pwd.code == code::PATH_CREATED {
            if let Some(dir) = quoted_path(&pwd.text) {
                control.home = dir;
            }
        }
        Ok(control)
    }

    fn login(&mut self) -> Result<(), TransportError> {
        let auth = |r: Reply| TransportError::Auth(format!("{} {}", r.code, r.text));
        let user = self.command(&format!("USER {}", self.endpoint.user))?;
        let reply = match user.code {
            code::LOGGED_IN => return Ok(()),
            code::NEED_PASSWORD => self.command(&format!("PASS {}", self.endpoint.password))?,
            _ => return Err(auth(user)),
        };
        // 332 (account needed) is not supported; it fails like a 530.
        if reply.is_completion() {
            Ok(())
        } else {
            Err(auth(reply))
        }
    }

    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| connection_error("control write", e))
    }

    /// Read one (possibly multi-line) reply.
    fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let first = self.read_line()?;
        let code = parse_code(&first)
            .ok_or_else(|| TransportError::Connection(format!("malformed reply: {}", first)))?;
        let mut text = first.get(4..).unwrap_or("").to_string();
        if first.as_bytes().get(3) == Some(&b'-') {
            let end = format!("{} ", code);
            loop {
                let line = self.read_line()?;
                if line.starts_with(&end) {
                    text.push('\n');
                    text.push_str(&line[4..]);
                    break;
                }
                text.push('\n');
                text.push_str(&line);
            }
        }
        Ok(Reply { code, text })
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| connection_error("control read", e))?;
        if n == 0 {
            return Err(TransportError::Connection(
                "control connection closed by server".into(),
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn command(&mut self, line: &str) -> Result<Reply, TransportError> {
        self.send(line)?;
        self.read_reply()
    }

    fn expect_completion(&mut self, line: &str) -> Result<Reply, TransportError> {
        let reply = self.command(line)?;
        if reply.is_completion() {
            Ok(reply)
        } else {
            Err(reply.into_error())
        }
    }

    /// Walk from the login directory into `dirs`, one segment at a time.
    fn change_to(&mut self, dirs: &[String]) -> Result<(), TransportError> {
        let home = self.home.clone();
        self.expect_completion(&format!("CWD {}", home))?;
        for dir in dirs {
            self.expect_completion(&format!("CWD {}", dir))?;
        }
        Ok(())
    }

    /// Open a passive data connection, trying PASV then EPSV.
    fn open_data(&mut self, timeout: Option<Duration>) -> Result<TcpStream, TransportError> {
        let pasv = self.command("PASV")?;
        let parsed = if pasv.is_completion() {
            parse_pasv_port(&pasv.text)
        } else {
            let epsv = self.command("EPSV")?;
            if !epsv.is_completion() {
                return Err(epsv.into_error());
            }
            parse_epsv_port(&epsv.text)
        };
        let port = parsed
            .ok_or_else(|| TransportError::Connection("unreadable passive mode reply".into()))?;
        // The address inside a PASV reply is ignored; data goes to the control host.
        let host = self.endpoint.host.clone();
        open_stream(&host, port, timeout)
    }

    fn quit(mut self) {
        let _ = self.writer.set_write_timeout(Some(QUIT_WAIT));
        let _ = self.writer.set_read_timeout(Some(QUIT_WAIT));
        let _ = self.command("QUIT");
    }
}

fn parse_code(line: &str) -> Option<u16> {
    let digits = line.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match line.as_bytes().get(3) {
        None | Some(b' ') | Some(b'-') => digits.parse().ok(),
        _ => None,
    }
}

/// `257 "/home/demo" is current directory`
fn quoted_path(text: &str) -> Option<String> {
    let start = text.find('"')? + 1;
    let mut out = String::new();
    let mut chars = text[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            // "" is an escaped quote inside the path
            if chars.peek() == Some(&'"') {
                out.push('"');
                chars.next();
                continue;
            }
            return Some(out);
        }
        out.push(c);
    }
    None
}

/// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
fn parse_pasv_port(text: &str) -> Option<u16> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let numbers: Vec<u16> = text[start..]
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .take(6)
        .map(|s| s.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    if numbers.len() != 6 || numbers[4] > 255 || numbers[5] > 255 {
        return None;
    }
    Some(numbers[4] * 256 + numbers[5])
}

/// `229 Entering Extended Passive Mode (|||6446|)`
fn parse_epsv_port(text: &str) -> Option<u16> {
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    let inner = &text[open + 1..close];
    let delim = inner.chars().next()?;
    inner.split(delim).nth(3)?.parse().ok()
}

#[derive(Default)]
pub struct FtpTransport {
    control: Option<Control>,
    connect_timeout: Option<Duration>,
}

impl FtpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound TCP connect time; reads stay blocking.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    fn control_for(&mut self, endpoint: &Endpoint) -> Result<&mut Control, TransportError> {
        let reusable = matches!(&self.control, Some(c) if &c.endpoint == endpoint);
        if !reusable {
            if let Some(old) = self.control.take() {
                old.quit();
            }
            self.control = Some(Control::open(endpoint, self.connect_timeout)?);
        }
        self.control
            .as_mut()
            .ok_or_else(|| TransportError::Connection("no control connection".into()))
    }

    fn run(&mut self, request: &Request<'_>, payload: Payload<'_>) -> Result<u64, TransportError> {
        let mut target = Target::parse(request.locator, request.credential)?;
        let timeout = self.connect_timeout;
        let verb = request.command.verb();

        match request.command {
            Command::List(_) => {
                // A listing always targets a directory.
                if let Some(name) = target.name.take() {
                    target.dirs.push(name);
                }
                let control = self.control_for(&target.endpoint)?;
                control.change_to(&target.dirs)?;
                data_round_trip(control, verb, timeout, payload)
            }
            Command::Retrieve | Command::Store => {
                let name = target.take_name()?;
                let control = self.control_for(&target.endpoint)?;
                control.change_to(&target.dirs)?;
                data_round_trip(control, &format!("{} {}", verb, name), timeout, payload)
            }
            Command::MakeDir | Command::Remove(_) => {
                let name = target.take_name()?;
                let control = self.control_for(&target.endpoint)?;
                control.change_to(&target.dirs)?;
                control.expect_completion(&format!("{} {}", verb, name))?;
                Ok(0)
            }
        }
    }
}

/// Send a data command over a fresh passive connection and stream the body.
fn data_round_trip(
    control: &mut Control,
    command: &str,
    timeout: Option<Duration>,
    payload: Payload<'_>,
) -> Result<u64, TransportError> {
    let mut data = control.open_data(timeout)?;
    let opening = control.command(command)?;
    if opening.is_completion() {
        // Nothing to transfer (some servers answer an empty listing this way).
        return Ok(0);
    }
    if !opening.is_preliminary() {
        return Err(opening.into_error());
    }

    let mut buf = vec![0u8; DATA_CHUNK];
    let mut total = 0u64;
    match payload {
        Payload::Sink(sink) => loop {
            let n = match data.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(connection_error("data read", e)),
            };
            sink.write_all(&buf[..n]).map_err(TransportError::Io)?;
            total += n as u64;
        },
        Payload::Source(source) => {
            loop {
                let n = match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(TransportError::Io(e)),
                };
                data.write_all(&buf[..n])
                    .map_err(|e| connection_error("data write", e))?;
                total += n as u64;
            }
            data.flush().map_err(|e| connection_error("data write", e))?;
        }
        Payload::None => {}
    }
    let _ = data.shutdown(Shutdown::Both);
    drop(data);

    let done = control.read_reply()?;
    if done.is_completion() {
        Ok(total)
    } else {
        Err(done.into_error())
    }
}

impl Transport for FtpTransport {
    fn perform(
        &mut self,
        request: &Request<'_>,
        payload: Payload<'_>,
    ) -> Result<u64, TransportError> {
        let result = self.run(request, payload);
        if let Err(e) = &result {
            // A negative reply leaves the control channel in step; anything
            // else may have left a reply unread, so start over next time.
            if !matches!(e, TransportError::Protocol { .. }) {
                self.control = None;
            }
        }
        result
    }

    fn disconnect(&mut self) {
        if let Some(control) = self.control.take() {
            control.quit();
        }
    }
}

impl Drop for FtpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
