//! Archive sources: where export reads archive bytes from.
//!
//! A source hands out an independent reader per byte range, so concurrent
//! exports of different entries never share a cursor, and a failed transfer
//! can be resumed by simply asking for the remaining range again.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Anything that can serve byte ranges of an archive.
pub trait ArchiveSource: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Opens a reader over `len` bytes starting at `offset`.
    ///
    /// The reader may yield fewer bytes than requested if the underlying
    /// transport fails; callers treat a short read as an error and retry.
    fn open_range(&self, offset: u64, len: u64) -> io::Result<Box<dyn Read + Send>>;
}

/// An archive on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveSource for LocalSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open_range(&self, offset: u64, len: u64) -> io::Result<Box<dyn Read + Send>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(file.take(len)))
    }
}

#[cfg(feature = "remote")]
pub use remote::HttpSource;

#[cfg(feature = "remote")]
mod remote {
    use std::io::{self, Read};
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::RANGE;
    use reqwest::StatusCode;

    use super::ArchiveSource;

    /// An archive served over HTTP(S) by a server that honours `Range` requests.
    #[derive(Debug, Clone)]
    pub struct HttpSource {
        url: String,
        client: Client,
    }

    impl HttpSource {
        pub fn new(url: impl Into<String>) -> io::Result<Self> {
            Self::with_timeout(url, Duration::from_secs(60))
        }

        pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> io::Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(Self::with_client(url, client))
        }

        /// Uses a preconfigured client, e.g. one with custom proxy or TLS settings.
        pub fn with_client(url: impl Into<String>, client: Client) -> Self {
            Self { url: url.into(), client }
        }
    }

    impl ArchiveSource for HttpSource {
        fn describe(&self) -> String {
            self.url.clone()
        }

        fn open_range(&self, offset: u64, len: u64) -> io::Result<Box<dyn Read + Send>> {
            if len == 0 {
                return Ok(Box::new(io::empty()));
            }
            let range = format!("bytes={}-{}", offset, offset + len - 1);
            let response = self
                .client
                .get(&self.url)
                .header(RANGE, range)
                .send()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            if response.status() != StatusCode::PARTIAL_CONTENT {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("expected 206 Partial Content, server answered {}", response.status()),
                ));
            }
            Ok(Box::new(response.take(len)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ranges_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"0123456789").unwrap();
        let source = LocalSource::new(&path);

        let mut first = source.open_range(2, 3).unwrap();
        let mut second = source.open_range(7, 10).unwrap();
        let mut a = String::new();
        let mut b = String::new();
        first.read_to_string(&mut a).unwrap();
        second.read_to_string(&mut b).unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("234", "789"));
    }

    #[cfg(feature = "remote")]
    mod http {
        use std::io::Write;
        use std::net::{TcpListener, TcpStream};
        use std::sync::{Arc, Mutex};
        use std::thread;

        use super::super::HttpSource;
        use crate::config::ExportOptions;
        use crate::error::ErrorKind;
        use crate::export::{export, ExportOutcome};
        use crate::index::{ArchiveEntry, ArchiveIndex};
        use crate::progress::SilentObserver;

        /// Serves `archive` on a loopback port and records every `Range` header.
        /// With `honour_ranges` unset it answers `200 OK` with the whole file.
        fn serve(archive: Vec<u8>, honour_ranges: bool) -> (String, Arc<Mutex<Vec<String>>>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}/archive.tar", listener.local_addr().unwrap());
            let ranges = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&ranges);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { continue };
                    let range = read_range_header(&mut stream);
                    seen.lock().unwrap().push(range.clone());
                    let response = if honour_ranges {
                        let (start, end) = parse_range(&range);
                        let body = &archive[start..=end];
                        let head = format!(
                            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\n\
                             Content-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                            body.len(),
                            start,
                            end,
                            archive.len()
                        );
                        [head.as_bytes(), body].concat()
                    } else {
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            archive.len()
                        );
                        [head.as_bytes(), &archive[..]].concat()
                    };
                    let _ = stream.write_all(&response);
                }
            });
            (url, ranges)
        }

        fn read_range_header(stream: &mut TcpStream) -> String {
            use std::io::Read;
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            String::from_utf8_lossy(&request)
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    key.eq_ignore_ascii_case("range").then(|| value.trim().to_string())
                })
                .unwrap_or_default()
        }

        fn parse_range(range: &str) -> (usize, usize) {
            let (start, end) = range.trim_start_matches("bytes=").split_once('-').unwrap();
            (start.parse().unwrap(), end.parse().unwrap())
        }

        fn fixture() -> (Vec<u8>, ArchiveIndex) {
            let archive: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
            let mut index = ArchiveIndex::new("remote.tar");
            let entry = ArchiveEntry {
                path: "e.bin".into(),
                offset: 1000,
                size: 1500,
                mode: None,
                mtime: None,
            };
            index.insert(entry);
            (archive, index)
        }

        fn source(url: String) -> HttpSource {
            let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
            HttpSource::with_client(url, client)
        }

        #[test]
        fn partial_content_is_exported() {
            let (archive, index) = fixture();
            let (url, ranges) = serve(archive.clone(), true);
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("e.bin");

            let options = ExportOptions::default().with_chunk_size(512);
            let source = source(url);
            let outcome =
                export(&source, &index, "e.bin", &dest, &options, &SilentObserver).unwrap();
            assert_eq!(outcome, ExportOutcome::Transferred { bytes: 1500 });
            assert_eq!(std::fs::read(&dest).unwrap(), &archive[1000..2500]);
            assert_eq!(*ranges.lock().unwrap(), vec!["bytes=1000-2499".to_string()]);
        }

        #[test]
        fn full_body_answer_is_a_transfer_error() {
            let (archive, index) = fixture();
            let (url, ranges) = serve(archive, false);
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("e.bin");

            let options = ExportOptions::default().with_max_attempts(2);
            let source = source(url);
            let err =
                export(&source, &index, "e.bin", &dest, &options, &SilentObserver).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Transfer);
            assert_eq!(ranges.lock().unwrap().len(), 2);
        }
    }
}
