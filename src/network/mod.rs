//! This module provides the networking functionality.
//!
//! The two parties are connected by a single mutually authenticated TLS 1.3 connection.
//! Party `0` acts as server and accepts the connection, party `1` acts as client.
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection, StreamOwned,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{fs, thread};

/// Index of the party that accepts the connection.
pub const SERVER_INDEX: usize = 0;
/// Index of the party that initiates the connection.
pub const CLIENT_INDEX: usize = 1;

pub trait NetSerializable: Sized {
    /// Returns the size in byte of a serialization of n_elements many elements
    fn serialized_size(n_elements: usize) -> usize;

    /// Serializes the elements
    fn as_byte_vec(elements: &[Self]) -> Vec<u8>;

    /// Deserializes `len` elements from a byte slice
    fn from_byte_vec(v: &[u8], len: usize) -> Vec<Self>;
}

impl NetSerializable for u64 {
    fn serialized_size(n_elements: usize) -> usize {
        8 * n_elements
    }

    fn as_byte_vec(elements: &[Self]) -> Vec<u8> {
        elements.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    fn from_byte_vec(v: &[u8], len: usize) -> Vec<Self> {
        debug_assert_eq!(v.len(), Self::serialized_size(len));
        v.chunks_exact(8)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                u64::from_le_bytes(bytes)
            })
            .collect()
    }
}

/// The network configuration of a party.
pub struct Config {
    player_addr: Vec<Ipv4Addr>,
    player_ports: Vec<u16>,
    player_certs: Vec<CertificateDer<'static>>,
    my_cert: CertificateDer<'static>,
    my_key: PrivateKeyDer<'static>,
}

impl Config {
    /// Creates a new network configuration for a party
    ///
    /// The inputs are
    /// - `player_addr` - the IP addresses of both parties
    /// - `player_ports` - the ports of both parties (only the server port is used to connect)
    /// - `player_certs` - the TLS certificates of both parties
    /// - `my_cert` - the TLS certificate of the local party
    /// - `my_key` - the TLS private key of the local party
    pub fn new(
        player_addr: Vec<Ipv4Addr>,
        player_ports: Vec<u16>,
        player_certs: Vec<CertificateDer<'static>>,
        my_cert: CertificateDer<'static>,
        my_key: PrivateKeyDer<'static>,
    ) -> Self {
        Self {
            player_addr,
            player_ports,
            player_certs,
            my_cert,
            my_key,
        }
    }

    fn load_certificate_from_file(
        config_path: &Path,
        cert_path: &Path,
    ) -> io::Result<CertificateDer<'static>> {
        let mut path = PathBuf::from(config_path);
        path.push(cert_path);
        let mut reader = BufReader::new(File::open(&path)?);
        let cert: io::Result<Vec<_>> = rustls_pemfile::certs(&mut reader).collect();
        let mut cert = cert?;
        if cert.len() != 1 {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Found {} certificates in {}, expected 1",
                    cert.len(),
                    path.display()
                ),
            ));
        }
        Ok(cert.remove(0))
    }

    fn load_private_key_from_file(
        config_path: &Path,
        key_path: &Path,
    ) -> io::Result<PrivateKeyDer<'static>> {
        let mut path = PathBuf::from(config_path);
        path.push(key_path);
        let mut reader = BufReader::new(File::open(&path)?);
        let key = rustls_pemfile::private_key(&mut reader)?;
        key.ok_or(io::Error::new(
            ErrorKind::InvalidData,
            format!("Invalid private key in {}", path.display()),
        ))
    }

    /// Loads the [Config]uration from a file and returns the index of the local party.
    ///
    /// Certificate and key paths are resolved relative to the directory of the file.
    pub fn from_file(path: &Path) -> io::Result<(usize, Self)> {
        let file_content = fs::read_to_string(path)?;
        let default_parent_dir = PathBuf::from("./");
        let parent_dir = path.parent().unwrap_or(&default_parent_dir);
        Self::from_toml_str(&file_content, parent_dir)
    }

    /// Parses a TOML configuration; relative paths are resolved against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> io::Result<(usize, Self)> {
        let parsed_config: SerializedConfig = toml::from_str(content)
            .map_err(|ser| io::Error::new(ErrorKind::InvalidData, format!("{}", ser)))?;
        // check party index is valid 1 <= party_index <= 2
        if parsed_config.party_index < 1 || parsed_config.party_index > 2 {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Invalid party_index: {}; must be 1 <= party_index <= 2",
                    parsed_config.party_index
                ),
            ));
        }
        let player_addr = vec![parsed_config.p1.address, parsed_config.p2.address];
        let player_ports = vec![parsed_config.p1.port, parsed_config.p2.port];
        let player_certs = vec![
            Self::load_certificate_from_file(base_dir, Path::new(&parsed_config.p1.certificate))?,
            Self::load_certificate_from_file(base_dir, Path::new(&parsed_config.p2.certificate))?,
        ];
        let key_path = match parsed_config.party_index {
            1 => parsed_config.p1.private_key,
            _ => parsed_config.p2.private_key,
        }
        .ok_or(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "No \"private_key\" field found in section [p{}]",
                parsed_config.party_index
            ),
        ))?;
        let key = Self::load_private_key_from_file(base_dir, Path::new(&key_path))?;
        let my_cert = player_certs[parsed_config.party_index - 1].clone();
        Ok((
            parsed_config.party_index - 1,
            Self::new(player_addr, player_ports, player_certs, my_cert, key),
        ))
    }
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            player_addr: self.player_addr.clone(),
            player_ports: self.player_ports.clone(),
            player_certs: self.player_certs.clone(),
            my_cert: self.my_cert.clone(),
            my_key: self.my_key.clone_key(),
        }
    }
}

/// The serialized network information for one party.
#[derive(Deserialize)]
struct SerializedPartyConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub certificate: String,
    pub private_key: Option<String>,
}

/// The serialized network configuration.
#[derive(Deserialize)]
struct SerializedConfig {
    pub party_index: usize,
    pub p1: SerializedPartyConfig,
    pub p2: SerializedPartyConfig,
}

/// A TLS connection used as part of a [CommChannel].
pub enum Stream {
    /// TLS connection as a client.
    Client(StreamOwned<ClientConnection, TcpStream>),
    /// TLS connection as a server.
    Server(StreamOwned<ServerConnection, TcpStream>),
}

impl Stream {
    fn as_mut_write(&mut self) -> &mut dyn Write {
        match self {
            Stream::Client(stream) => stream,
            Stream::Server(stream) => stream,
        }
    }

    fn as_mut_read(&mut self) -> &mut dyn Read {
        match self {
            Stream::Client(stream) => stream,
            Stream::Server(stream) => stream,
        }
    }

    /// Drives the TLS handshake to completion.
    pub fn complete_handshake_blocking(&mut self) -> io::Result<()> {
        match self {
            Self::Client(stream) => stream.conn.complete_io(&mut stream.sock).map(|_| ()),
            Self::Server(stream) => stream.conn.complete_io(&mut stream.sock).map(|_| ()),
        }
    }

    /// Closes the TLS connection.
    pub fn teardown(self) -> io::Result<()> {
        match self {
            Self::Client(mut stream) => {
                stream.conn.send_close_notify();
                while stream.conn.wants_write() {
                    stream.conn.write_tls(&mut stream.sock)?;
                }
            }
            Self::Server(mut stream) => {
                stream.conn.send_close_notify();
                while stream.conn.wants_write() {
                    stream.conn.write_tls(&mut stream.sock)?;
                }
            }
        }
        Ok(())
    }
}

/// A communication channel between the local party and the other party.
pub struct CommChannel {
    /// Defines the party on the other end.
    pub to: usize,
    stream: Option<Stream>,
    bytes_sent: u64,
    bytes_received: u64,
    rounds: usize,
}

impl CommChannel {
    fn new_server_config(
        client_cert: &CertificateDer<'static>,
        my_cert: &CertificateDer<'static>,
        my_key: PrivateKeyDer<'static>,
    ) -> io::Result<ServerConfig> {
        let mut root_store = RootCertStore::empty();
        root_store.add(client_cert.clone()).map_err(tls_error)?;
        let client_verifier = WebPkiClientVerifier::builder(root_store.into())
            .build()
            .map_err(tls_error)?;
        ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(vec![my_cert.clone()], my_key)
            .map_err(tls_error)
    }

    fn new_client_config(
        server_cert: &CertificateDer<'static>,
        my_cert: &CertificateDer<'static>,
        my_key: PrivateKeyDer<'static>,
    ) -> io::Result<ClientConfig> {
        let mut root_store = RootCertStore::empty();
        root_store.add(server_cert.clone()).map_err(tls_error)?;
        ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_root_certificates(root_store)
            .with_client_auth_cert(vec![my_cert.clone()], my_key)
            .map_err(tls_error)
    }

    fn new(to: usize, stream: Stream) -> Self {
        Self {
            to,
            stream: Some(stream),
            bytes_sent: 0,
            bytes_received: 0,
            rounds: 0,
        }
    }

    /// Establishes a new communication channel where the local party acts as server.
    pub fn new_server(config: &Config, server_socket: TcpListener, to: usize) -> io::Result<Self> {
        let (sock, _) = server_socket.accept()?;
        sock.set_nodelay(true)?;
        let conn = ServerConnection::new(
            Self::new_server_config(
                &config.player_certs[to],
                &config.my_cert,
                config.my_key.clone_key(),
            )?
            .into(),
        )
        .map_err(tls_error)?;
        Ok(Self::new(to, Stream::Server(StreamOwned::new(conn, sock))))
    }

    /// Establishes a new communication channel where the local party acts as client.
    ///
    /// Connection attempts are repeated until `timeout` is reached (forever if `None`).
    pub fn new_client(config: &Config, to: usize, timeout: Option<Duration>) -> io::Result<Self> {
        let addr: Ipv4Addr = config.player_addr[to];
        let port = config.player_ports[to];
        let start_time = Instant::now();
        let sock = loop {
            match TcpStream::connect((addr, port)) {
                Ok(sock) => break sock,
                Err(io_err) if io_err.kind() == ErrorKind::ConnectionRefused => {
                    if let Some(timeout) = timeout {
                        if start_time.elapsed() >= timeout {
                            return Err(io::Error::new(
                                ErrorKind::NotConnected,
                                format!(
                                    "Cannot connect to {}:{} after {}s",
                                    addr,
                                    port,
                                    timeout.as_secs_f32()
                                ),
                            ));
                        }
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(io_err) => return Err(io_err),
            }
        };
        sock.set_nodelay(true)?;
        let conn = ClientConnection::new(
            Self::new_client_config(
                &config.player_certs[to],
                &config.my_cert,
                config.my_key.clone_key(),
            )?
            .into(),
            ServerName::IpAddress(rustls::pki_types::IpAddr::V4(addr.into())),
        )
        .map_err(tls_error)?;
        Ok(Self::new(to, Stream::Client(StreamOwned::new(conn, sock))))
    }

    fn stream_mut(&mut self) -> io::Result<&mut Stream> {
        self.stream.as_mut().ok_or(io::Error::new(
            ErrorKind::NotConnected,
            "Connection was closed",
        ))
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bytes_sent += bytes.len() as u64;
        self.rounds += 1;
        let stream = self.stream_mut()?.as_mut_write();
        stream.write_all(bytes)?;
        stream.flush()
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> io::Result<()> {
        self.bytes_received += buffer.len() as u64;
        self.rounds += 1;
        self.stream_mut()?.as_mut_read().read_exact(buffer)
    }

    /// Sends the serialization of `elements`.
    pub fn send_field<T: NetSerializable>(&mut self, elements: &[T]) -> io::Result<()> {
        self.write(&T::as_byte_vec(elements))
    }

    /// Receives `n_elements` many elements.
    pub fn receive_field<T: NetSerializable>(&mut self, n_elements: usize) -> io::Result<Vec<T>> {
        let mut buf = vec![0u8; T::serialized_size(n_elements)];
        self.read(&mut buf)?;
        Ok(T::from_byte_vec(&buf, n_elements))
    }

    pub fn get_bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn get_bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn get_rounds(&self) -> usize {
        self.rounds
    }

    pub fn reset_stats(&mut self) {
        self.bytes_sent = 0;
        self.bytes_received = 0;
        self.rounds = 0;
    }

    /// Closes the communication channel properly. This may block if data needs to be written
    pub fn teardown(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => stream.teardown(),
            None => Ok(()),
        }
    }
}

fn tls_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> io::Error {
    io::Error::new(ErrorKind::Other, err)
}

/// The communication interface of a party.
pub struct ConnectedParty {
    /// The party's index `i`.
    pub i: usize,
    /// The network configuration.
    pub config: Config,
    /// Channel to the other party.
    pub comm: CommChannel,
}

impl ConnectedParty {
    /// Establishes the basic network interface and connects to the other party.
    ///
    /// The inputs are
    /// - `i` - the party's index
    /// - `config` - the network configuration
    /// - `timeout` - an optional timeout value
    pub fn bind_and_connect(
        i: usize,
        config: Config,
        timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let party = if i == SERVER_INDEX {
            CreatedParty::bind(
                i,
                IpAddr::V4(config.player_addr[i]),
                config.player_ports[i],
            )?
        } else {
            CreatedParty::client(i)
        };
        party.connect(config, timeout)
    }
}

/// The basic network interface of a party
pub struct CreatedParty {
    i: usize,
    server_socket: Option<TcpListener>,
}

impl CreatedParty {
    /// Binds the interface of the server party to the given address and port.
    pub fn bind(i: usize, addr: IpAddr, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((addr, port))?;
        Ok(Self {
            i,
            server_socket: Some(listener),
        })
    }

    /// Creates the interface of the client party; the client does not listen.
    pub fn client(i: usize) -> Self {
        Self {
            i,
            server_socket: None,
        }
    }

    /// Returns the port of the [CreatedParty].
    pub fn port(&self) -> io::Result<u16> {
        match &self.server_socket {
            Some(socket) => socket.local_addr().map(|socket_addr| socket_addr.port()),
            None => Err(io::Error::new(
                ErrorKind::AddrNotAvailable,
                "Client party does not listen on a port",
            )),
        }
    }

    /// Establishes the connection with the other party.
    ///
    /// If successful returns a [ConnectedParty].
    pub fn connect(self, config: Config, timeout: Option<Duration>) -> io::Result<ConnectedParty> {
        let mut comm = match (self.i, self.server_socket) {
            (SERVER_INDEX, Some(socket)) => CommChannel::new_server(&config, socket, CLIENT_INDEX)?,
            (CLIENT_INDEX, _) => CommChannel::new_client(&config, SERVER_INDEX, timeout)?,
            (i, _) => {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("Invalid party index {} or missing server socket", i),
                ))
            }
        };
        comm.stream_mut()?.complete_handshake_blocking()?;
        Ok(ConnectedParty {
            i: self.i,
            config,
            comm,
        })
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::PathBuf;

    use crate::network::{Config, NetSerializable};
    use crate::party::test_export::localhost_connect;

    #[test]
    fn u64_serialization() {
        let values = vec![0u64, 1, u64::MAX, 0x0102_0304_0506_0708];
        let bytes = u64::as_byte_vec(&values);
        assert_eq!(bytes.len(), u64::serialized_size(values.len()));
        assert_eq!(&bytes[24..32], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(u64::from_byte_vec(&bytes, values.len()), values);
    }

    #[test]
    fn channel_send_receive() {
        let (p0, p1) = localhost_connect(
            |mut p| {
                p.comm.send_field(&[1u64, 2, 3]).unwrap();
                let received: Vec<u64> = p.comm.receive_field(2).unwrap();
                assert_eq!(received, vec![40, 50]);
                p.comm.teardown().unwrap();
                (p.comm.get_bytes_sent(), p.comm.get_bytes_received(), p.comm.get_rounds())
            },
            |mut p| {
                let received: Vec<u64> = p.comm.receive_field(3).unwrap();
                assert_eq!(received, vec![1, 2, 3]);
                p.comm.send_field(&[40u64, 50]).unwrap();
                p.comm.teardown().unwrap();
                (p.comm.get_bytes_sent(), p.comm.get_bytes_received(), p.comm.get_rounds())
            },
        );
        assert_eq!(p0, (24, 16, 2));
        assert_eq!(p1, (16, 24, 2));
    }

    fn write_test_keys(dir: &PathBuf) {
        fs::create_dir_all(dir).unwrap();
        for name in ["p1", "p2"] {
            let rcgen::CertifiedKey { cert, key_pair } =
                rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
            fs::write(dir.join(format!("{}.pem", name)), cert.pem()).unwrap();
            fs::write(dir.join(format!("{}.key", name)), key_pair.serialize_pem()).unwrap();
        }
    }

    #[test]
    fn config_from_toml() {
        let dir = std::env::temp_dir().join(format!("obs-config-{}", std::process::id()));
        write_test_keys(&dir);
        let content = r#"
            party_index = 2
            [p1]
            address = "127.0.0.1"
            port = 8100
            certificate = "p1.pem"
            [p2]
            address = "127.0.0.1"
            port = 8101
            certificate = "p2.pem"
            private_key = "p2.key"
        "#;
        let (i, config) = Config::from_toml_str(content, &dir).unwrap();
        assert_eq!(i, 1);
        assert_eq!(config.player_ports, vec![8100, 8101]);
        assert_eq!(config.my_cert, config.player_certs[1]);

        // party 1 has no private key in this file
        let err = Config::from_toml_str(&content.replace("party_index = 2", "party_index = 1"), &dir)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = Config::from_toml_str(&content.replace("party_index = 2", "party_index = 3"), &dir)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = Config::from_toml_str(&content.replace("p1.pem", "missing.pem"), &dir)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        fs::remove_dir_all(&dir).unwrap();
    }
}
