use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Address the router daemon accepts connections on.
///
/// Written as `unix:///run/batchrpc/batchrpcd.sock` or `tcp://127.0.0.1:9797`
/// on the command line and in the environment; as a tagged table in TOML.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket.
    Unix {
        /// Socket file.
        path: Utf8PathBuf,
    },
    /// TCP socket.
    Tcp {
        /// Host name or literal address.
        host: String,
        /// Port; `0` picks an ephemeral one.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Unix endpoint at `path`.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// TCP endpoint at `host:port`.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket file of a Unix endpoint.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        if let Self::Unix { path } = self {
            Some(path)
        } else {
            None
        }
    }

    /// Creates the directory that will hold a Unix socket, owner-only.
    ///
    /// TCP endpoints need nothing and succeed immediately. An existing
    /// directory is left as it is.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the socket path has no parent
    /// or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let directory = path
            .parent()
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_owned(),
            })?;
        match owner_only_dir_builder().create(directory) {
            Err(source) if source.kind() != io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: directory.to_owned(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

fn owner_only_dir_builder() -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        let missing = |part| SocketParseError::Incomplete {
            part,
            input: input.to_owned(),
        };
        match url.scheme() {
            "unix" if url.path().is_empty() => Err(missing("socket path")),
            "unix" => Ok(Self::unix(url.path())),
            "tcp" => {
                let host = url.host_str().ok_or_else(|| missing("host"))?;
                let port = url.port().ok_or_else(|| missing("port"))?;
                Ok(Self::tcp(host, port))
            }
            scheme => Err(SocketParseError::UnsupportedScheme(scheme.to_owned())),
        }
    }
}

/// Errors raised while parsing a [`SocketEndpoint`].
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Only `unix` and `tcp` are understood.
    #[error("unsupported socket scheme '{0}', expected 'unix' or 'tcp'")]
    UnsupportedScheme(String),
    /// The address lacks a component its scheme requires.
    #[error("'{input}' has no {part}")]
    Incomplete {
        /// Missing component.
        part: &'static str,
        /// Text that was parsed.
        input: String,
    },
    /// The text is not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised while creating the directory of a Unix socket.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path is a bare root or empty.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Socket path.
        path: Utf8PathBuf,
    },
    /// The directory could not be created.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory being created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SocketEndpoint::unix("/tmp/batchrpcd.sock"), "unix:///tmp/batchrpcd.sock")]
    #[case(SocketEndpoint::tcp("127.0.0.1", 9000), "tcp://127.0.0.1:9000")]
    fn endpoints_display_as_urls(#[case] endpoint: SocketEndpoint, #[case] text: &str) {
        assert_eq!(endpoint.to_string(), text);
        assert_eq!(text.parse::<SocketEndpoint>().expect("endpoint"), endpoint);
    }

    #[rstest]
    #[case("http://127.0.0.1:80")]
    #[case("tcp://127.0.0.1")]
    #[case("not a url")]
    fn rejects_unusable_endpoints(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err());
    }

    #[test]
    fn missing_port_is_named() {
        let error = "tcp://localhost".parse::<SocketEndpoint>().expect_err("no port");
        assert_eq!(error.to_string(), "'tcp://localhost' has no port");
    }

    #[test]
    fn prepares_socket_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("nested").join("batchrpcd.sock");
        let endpoint =
            SocketEndpoint::unix(Utf8PathBuf::from_path_buf(socket.clone()).expect("utf8 path"));
        endpoint.prepare_filesystem().expect("prepare directory");
        endpoint.prepare_filesystem().expect("directory already present");
        assert!(socket.parent().is_some_and(std::path::Path::is_dir));
    }

    #[test]
    fn tcp_endpoints_need_no_preparation() {
        SocketEndpoint::tcp("127.0.0.1", 0)
            .prepare_filesystem()
            .expect("nothing to prepare");
    }
}
