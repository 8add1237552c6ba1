//! Check that an OFTP server is available: connect over TCP and wait for
//! the ready banner.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::{Resource, Runner, ServiceState};

/// Plugin to check if a OFTP server is available.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// OFTP server address.
    #[arg(short = 'H', long)]
    hostname: String,

    /// OFTP server port.
    #[arg(short = 'p', long)]
    port: u16,

    /// Response timeout in seconds.
    #[arg(short = 't', long, default_value_t = 5.0)]
    timeout: f64,

    /// Log debug information to stderr.
    #[arg(short = 'd', long)]
    debug: bool,
}

const READY_BANNER: &str = "READY";
// The banner fits easily; anything longer means it is not coming.
const MAX_BANNER_BYTES: usize = 4096;

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_oftp", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.debug);

    let timeout = Duration::from_secs_f64(cli.timeout);
    let addr = (cli.hostname.as_str(), cli.port)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {}:{}", cli.hostname, cli.port))?
        .next()
        .with_context(|| format!("no address found for {}", cli.hostname))?;

    let resource = Resource::new("OFTP");
    let stream = match TcpStream::connect_timeout(&addr, timeout) {
        Ok(stream) => stream,
        Err(e) => {
            debug!("connect to {} failed: {}", addr, e);
            return Ok(resource
                .with_state(ServiceState::Critical)
                .with_description("Cannot establish a connection to OFTP server !"));
        }
    };
    stream
        .set_read_timeout(Some(timeout))
        .context("cannot set socket timeout")?;

    Ok(wait_for_banner(stream, resource))
}

fn wait_for_banner(mut stream: impl Read, resource: Resource) -> Resource {
    let mut banner = Vec::new();
    let mut chunk = [0u8; 32];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                return resource
                    .with_state(ServiceState::Critical)
                    .with_description("OFTP server closed the connection before becoming ready !")
            }
            Ok(n) => {
                banner.extend_from_slice(&chunk[..n]);
                if String::from_utf8_lossy(&banner).contains(READY_BANNER) {
                    return resource
                        .with_state(ServiceState::Ok)
                        .with_description("OFTP server is available.");
                }
                if banner.len() > MAX_BANNER_BYTES {
                    return resource
                        .with_state(ServiceState::Critical)
                        .with_description("OFTP server did not present a ready banner !");
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return resource
                    .with_state(ServiceState::Critical)
                    .with_description(
                        "OFTP server is reachable but did not answered in time !",
                    )
            }
            Err(e) => {
                debug!("read failed: {}", e);
                return resource
                    .with_state(ServiceState::Critical)
                    .with_description("Connection to OFTP server was lost !");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct ChunkedReader {
        chunks: Vec<io::Result<Vec<u8>>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(data) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn test_ready_banner_is_ok() {
        let reader = ChunkedReader {
            chunks: vec![Ok(b"ODETTE FTP ".to_vec()), Ok(b"READY\r\n".to_vec())],
        };
        let resource = wait_for_banner(reader, Resource::new("OFTP"));
        assert_eq!(resource.state(), ServiceState::Ok);
        assert!(resource
            .to_nagios_string()
            .starts_with("OFTP OK: OFTP server is available."));
    }

    #[test]
    fn test_read_timeout_is_critical() {
        let reader = ChunkedReader {
            chunks: vec![Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))],
        };
        let resource = wait_for_banner(reader, Resource::new("OFTP"));
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(resource.exit_code(), 2);
        assert!(resource
            .to_nagios_string()
            .contains("did not answered in time"));
    }

    #[test]
    fn test_eof_before_banner_is_critical() {
        let reader = ChunkedReader {
            chunks: vec![Ok(b"BUSY".to_vec())],
        };
        let resource = wait_for_banner(reader, Resource::new("OFTP"));
        assert_eq!(resource.state(), ServiceState::Critical);
        assert!(resource
            .to_nagios_string()
            .contains("closed the connection"));
    }
}
