//! FTP/FTPS backend
//!
//! Each call dials a fresh session, logs in, runs one command and quits.
//! No connection is kept between calls.

use std::io::Cursor;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, SystemTime};

use reqwest::Url;
use suppaftp::types::{FileType, Mode};
use suppaftp::{FtpError, FtpStream, NativeTlsConnector, NativeTlsFtpStream};
use tracing::debug;

use super::{BackendError, BackendResult, RootIdentity, StorageBackend};
use crate::cancel::CancelToken;
use crate::fs::{Entry, EntryInfo, SysInfo};
use crate::utils;

/// Timeout for establishing the control connection.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS mode, fixed when the backend is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpTls {
    /// Plain FTP
    #[default]
    None,
    /// `AUTH TLS` after connecting (FTPES)
    Explicit,
    /// TLS from the first byte (FTPS, usually port 990)
    Implicit,
}

/// Connection settings for an FTP backend.
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Root path shown as the top of the breadcrumb trail
    pub root_path: String,
    pub tls: FtpTls,
    /// Passive mode (required behind most NAT/firewalls)
    pub passive: bool,
}

impl FtpConfig {
    /// Build settings from an `ftp://` or `ftps://` URL.
    pub fn from_url(url: &Url, passive: bool) -> Result<Self, String> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| "host is required".to_string())?
            .to_string();
        let implicit = url
            .query_pairs()
            .any(|(k, v)| k == "tls" && v.eq_ignore_ascii_case("implicit"));
        let tls = match (url.scheme(), implicit) {
            (_, true) => FtpTls::Implicit,
            ("ftps", false) => FtpTls::Explicit,
            _ => FtpTls::None,
        };
        let default_port = if tls == FtpTls::Implicit { 990 } else { 21 };
        let user = match url.username() {
            "" => "anonymous".to_string(),
            u => utils::percent_decode(u),
        };
        let password = url
            .password()
            .map(utils::percent_decode)
            .unwrap_or_else(|| "anonymous@".to_string());

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
            user,
            password,
            root_path: "/".to_string(),
            tls,
            passive,
        })
    }
}

/// Either a plain or a TLS control connection
enum FtpConnection {
    Plain(FtpStream),
    Tls(NativeTlsFtpStream),
}

impl FtpConnection {
    fn list(&mut self, path: Option<&str>) -> suppaftp::FtpResult<Vec<String>> {
        match self {
            FtpConnection::Plain(s) => s.list(path),
            FtpConnection::Tls(s) => s.list(path),
        }
    }

    fn put_file(&mut self, path: &str, reader: &mut impl std::io::Read) -> suppaftp::FtpResult<u64> {
        match self {
            FtpConnection::Plain(s) => s.put_file(path, reader),
            FtpConnection::Tls(s) => s.put_file(path, reader),
        }
    }

    fn rm(&mut self, path: &str) -> suppaftp::FtpResult<()> {
        match self {
            FtpConnection::Plain(s) => s.rm(path),
            FtpConnection::Tls(s) => s.rm(path),
        }
    }

    fn rmdir(&mut self, path: &str) -> suppaftp::FtpResult<()> {
        match self {
            FtpConnection::Plain(s) => s.rmdir(path),
            FtpConnection::Tls(s) => s.rmdir(path),
        }
    }

    fn mkdir(&mut self, path: &str) -> suppaftp::FtpResult<()> {
        match self {
            FtpConnection::Plain(s) => s.mkdir(path),
            FtpConnection::Tls(s) => s.mkdir(path),
        }
    }

    fn quit(&mut self) -> suppaftp::FtpResult<()> {
        match self {
            FtpConnection::Plain(s) => s.quit(),
            FtpConnection::Tls(s) => s.quit(),
        }
    }
}

/// FTP backend
pub struct FtpBackend {
    config: FtpConfig,
}

impl FtpBackend {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, path: &str) -> BackendResult<SocketAddr> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        addr.to_socket_addrs()
            .map_err(|e| BackendError::Connection {
                path: path.to_string(),
                message: format!("cannot resolve {}: {}", addr, e),
            })?
            .next()
            .ok_or_else(|| BackendError::Connection {
                path: path.to_string(),
                message: format!("no address for {}", addr),
            })
    }

    /// Dial, secure and log in a new session.
    fn dial(&self, path: &str) -> BackendResult<FtpConnection> {
        let cfg = &self.config;
        let addr = self.resolve(path)?;
        let err = |e| map_ftp_error(path, e);
        debug!("ftp: dialing {} ({:?})", addr, cfg.tls);

        let mut conn = match cfg.tls {
            FtpTls::None => {
                let ftp = FtpStream::connect_timeout(addr, DIAL_TIMEOUT).map_err(err)?;
                FtpConnection::Plain(ftp)
            }
            FtpTls::Explicit => {
                let ftp = NativeTlsFtpStream::connect_timeout(addr, DIAL_TIMEOUT).map_err(err)?;
                let ftp = ftp
                    .into_secure(tls_connector(path)?, &cfg.host)
                    .map_err(err)?;
                FtpConnection::Tls(ftp)
            }
            FtpTls::Implicit => {
                // suppaftp has no timeout variant for implicit TLS. The probe
                // bounds only the dial to an unreachable host; the TLS
                // handshake on the second connection is unbounded.
                std::net::TcpStream::connect_timeout(&addr, DIAL_TIMEOUT)
                    .map_err(|e| BackendError::Connection {
                        path: path.to_string(),
                        message: e.to_string(),
                    })?;
                let ftp = NativeTlsFtpStream::connect_secure_implicit(
                    addr,
                    tls_connector(path)?,
                    &cfg.host,
                )
                .map_err(err)?;
                FtpConnection::Tls(ftp)
            }
        };

        match &mut conn {
            FtpConnection::Plain(s) => {
                if cfg.passive {
                    s.set_mode(Mode::Passive);
                }
                s.login(&cfg.user, &cfg.password).map_err(err)?;
                s.transfer_type(FileType::Binary).map_err(err)?;
            }
            FtpConnection::Tls(s) => {
                if cfg.passive {
                    s.set_mode(Mode::Passive);
                }
                s.login(&cfg.user, &cfg.password).map_err(err)?;
                s.transfer_type(FileType::Binary).map_err(err)?;
            }
        }
        Ok(conn)
    }

    /// Run one command on a fresh session.
    fn with_session<T>(
        &self,
        cancel: &CancelToken,
        path: &str,
        f: impl FnOnce(&mut FtpConnection) -> suppaftp::FtpResult<T>,
    ) -> BackendResult<T> {
        if cancel.is_cancelled() {
            return Err(BackendError::cancelled(path));
        }
        let mut conn = self.dial(path)?;
        if cancel.is_cancelled() {
            let _ = conn.quit();
            return Err(BackendError::cancelled(path));
        }
        let result = f(&mut conn).map_err(|e| map_ftp_error(path, e));
        let _ = conn.quit();
        result
    }
}

fn tls_connector(path: &str) -> BackendResult<NativeTlsConnector> {
    let connector =
        suppaftp::native_tls::TlsConnector::new().map_err(|e| BackendError::Connection {
            path: path.to_string(),
            message: format!("TLS setup failed: {}", e),
        })?;
    Ok(NativeTlsConnector::from(connector))
}

impl StorageBackend for FtpBackend {
    fn root(&self) -> RootIdentity {
        let cfg = &self.config;
        let scheme = if cfg.tls == FtpTls::None { "ftp" } else { "ftps" };
        let default_port = if cfg.tls == FtpTls::Implicit { 990 } else { 21 };
        let authority = if cfg.port != default_port {
            format!("{}:{}", cfg.host, cfg.port)
        } else {
            cfg.host.clone()
        };
        let raw = format!("{}://{}{}", scheme, authority, cfg.root_path);
        let url = Url::parse(&raw)
            .or_else(|_| Url::parse(&format!("{}://{}/", scheme, authority)))
            .unwrap_or_else(|_| Url::parse("ftp://invalid/").expect("static URL is valid"));
        RootIdentity {
            title: format!("{}://{}@{}", scheme, cfg.user, authority),
            url,
            path: utils::normalize_path(&cfg.root_path),
        }
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>> {
        let path = utils::normalize_path(path);
        let lines = self.with_session(cancel, &path, |conn| conn.list(Some(&path)))?;
        if cancel.is_cancelled() {
            return Err(BackendError::cancelled(path));
        }
        Ok(lines.iter().filter_map(|l| parse_list_line(l)).collect())
    }

    fn create_directory(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        self.with_session(cancel, path, |conn| conn.mkdir(path))
    }

    fn create_file(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        self.with_session(cancel, path, |conn| {
            conn.put_file(path, &mut Cursor::new(Vec::<u8>::new()))
                .map(|_| ())
        })
    }

    fn delete(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        self.with_session(cancel, path, |conn| match conn.rm(path) {
            Ok(()) => Ok(()),
            // Maybe it's a directory
            Err(_) => conn.rmdir(path),
        })
    }

    fn home_path(&self) -> Option<String> {
        Some(utils::normalize_path(&self.config.root_path))
    }
}

/// Parse one line of Unix-style `LIST` output. Returns `None` for `.`, `..`
/// and lines that are not entries (e.g. `total 12`).
fn parse_list_line(line: &str) -> Option<Entry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        return None;
    }

    let perms = parts[0];
    let is_dir = perms.starts_with('d');
    let is_symlink = perms.starts_with('l');
    let size: u64 = parts[4].parse().unwrap_or(0);

    // Names may contain spaces; take the rest of the line after the date
    let name_str = nth_field_onwards(line, 8)?;
    let name = if is_symlink {
        name_str.split(" -> ").next().unwrap_or(name_str)
    } else {
        name_str
    };

    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return None;
    }

    let info = EntryInfo {
        size: if is_dir { 0 } else { size },
        modified: parse_ftp_date(parts[5], parts[6], parts[7]),
        sys: SysInfo {
            mode: parse_unix_permissions(perms),
            owner: parts[2].to_string(),
            group: parts[3].to_string(),
        },
    };
    Some(Entry::with_info(name, is_dir, info))
}

/// Slice of `line` starting at whitespace-separated field `n`.
fn nth_field_onwards(line: &str, n: usize) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    Some(rest.trim_end_matches(['\r', '\n']))
}

/// Convert a suppaftp error into a backend error for `path`
fn map_ftp_error(path: &str, e: FtpError) -> BackendError {
    let path = path.to_string();
    match &e {
        FtpError::ConnectionError(io) => BackendError::Connection {
            path,
            message: io.to_string(),
        },
        FtpError::SecureError(msg) => BackendError::Connection {
            path,
            message: format!("TLS error: {}", msg),
        },
        FtpError::UnexpectedResponse(resp) => {
            let body = String::from_utf8_lossy(&resp.body).trim().to_string();
            match resp.status.code() {
                530 => BackendError::Auth {
                    path,
                    message: "login incorrect".to_string(),
                },
                550 => BackendError::NotFound { path },
                553 | 451 => BackendError::PermissionDenied { path },
                code => BackendError::Other {
                    path,
                    message: format!("FTP error {}: {}", code, body),
                },
            }
        }
        _ => BackendError::Other {
            path,
            message: e.to_string(),
        },
    }
}

/// Parse a Unix permission string (e.g. "drwxr-xr-x") to mode bits
fn parse_unix_permissions(perms: &str) -> u32 {
    let chars: Vec<char> = perms.chars().collect();
    if chars.len() < 10 {
        return 0;
    }

    const BITS: [(usize, &[char], u32); 9] = [
        (1, &['r'], 0o400),
        (2, &['w'], 0o200),
        (3, &['x', 's'], 0o100),
        (4, &['r'], 0o040),
        (5, &['w'], 0o020),
        (6, &['x', 's'], 0o010),
        (7, &['r'], 0o004),
        (8, &['w'], 0o002),
        (9, &['x', 't'], 0o001),
    ];
    BITS.iter()
        .filter(|(idx, set, _)| set.contains(&chars[*idx]))
        .fold(0, |mode, (_, _, bit)| mode | bit)
}

/// Parse the date columns of a `LIST` line. Lines with a time instead of a
/// year are dated in the current year.
fn parse_ftp_date(month: &str, day: &str, time_or_year: &str) -> Option<SystemTime> {
    use std::time::UNIX_EPOCH;

    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let month_num = MONTHS
        .iter()
        .position(|m| month.eq_ignore_ascii_case(m))? as u32
        + 1;
    let day_num: u32 = day.parse().ok()?;

    let (year, hour, minute) = match time_or_year.split_once(':') {
        Some((h, m)) => (current_year(), h.parse().ok()?, m.parse().ok()?),
        None => (time_or_year.parse().ok()?, 0u64, 0u64),
    };

    let days = days_since_unix_epoch(year, month_num, day_num)?;
    let seconds = days * 86400 + hour * 3600 + minute * 60;
    Some(UNIX_EPOCH + Duration::from_secs(seconds))
}

fn current_year() -> i32 {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut year = 1970;
    let mut days = secs / 86400;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if days < len {
            return year;
        }
        days -= len;
        year += 1;
    }
}

fn is_leap(y: i32) -> bool {
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}

/// Days since 1970-01-01
fn days_since_unix_epoch(year: i32, month: u32, day: u32) -> Option<u64> {
    if year < 1970 || !(1..=12).contains(&month) || day == 0 {
        return None;
    }

    const MONTH_DAYS: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut days: u64 = (1970..year)
        .map(|y| if is_leap(y) { 366 } else { 365 })
        .sum();
    for m in 1..month {
        days += MONTH_DAYS[(m - 1) as usize];
        if m == 2 && is_leap(year) {
            days += 1;
        }
    }
    Some(days + (day - 1) as u64)
}
