//! Synchronous client for the sort-offload service.
//!
//! One request in flight per connection: `sort` sends a frame and blocks
//! until the matching response is fully consumed before returning. The two
//! server-side measurements ride along with every response and are kept as
//! the last-measured values for the load-generation driver to collect.

use crate::error::Error;
use crate::wire;
use std::io::{self, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;

/// Connected peer of any of the three server architectures. The wire
/// protocol is identical, so the client cannot tell them apart except by
/// latency.
pub struct Client {
    stream: TcpStream,
    processing_time: Duration,
    sort_time: Duration,
}

impl Client {
    /// Connect to a server. Any socket error surfaces as
    /// [`Error::Connection`].
    pub fn connect(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).map_err(Error::Connection)?;
        debug!(host, port, "Connected to sort server");
        Ok(Self {
            stream,
            processing_time: Duration::ZERO,
            sort_time: Duration::ZERO,
        })
    }

    /// Send one request and block for its response.
    ///
    /// On success the returned array is the ascending permutation of the
    /// input and [`processing_time`](Self::processing_time) /
    /// [`sort_time`](Self::sort_time) reflect this exchange.
    pub fn sort(&mut self, values: &[i32]) -> Result<Vec<i32>, Error> {
        let request = wire::encode_request(values);
        self.stream.write_all(&request)?;
        self.stream.flush()?;

        let processing_ms = wire::read_u64(&mut self.stream)?;
        let sort_ms = wire::read_u64(&mut self.stream)?;
        let payload = wire::read_frame(&mut self.stream)?.ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before response payload",
            ))
        })?;
        let sorted = wire::decode_array(&payload)?;

        self.processing_time = Duration::from_millis(processing_ms);
        self.sort_time = Duration::from_millis(sort_ms);
        Ok(sorted)
    }

    /// Server-side processing duration of the last completed exchange.
    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    /// Server-side sort duration of the last completed exchange, a
    /// sub-interval of the processing duration.
    pub fn sort_time(&self) -> Duration {
        self.sort_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    /// One canned exchange served over a real socket, so the client's
    /// read sequence is checked against the exact wire layout.
    #[test]
    fn test_client_reads_response_fields() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let payload = wire::read_frame(&mut stream).unwrap().unwrap();
            let values = wire::decode_array(&payload).unwrap();
            assert_eq!(values, vec![3, -1, 6]);

            let sorted = wire::encode_array(&[-1, 3, 6]);
            let response = wire::encode_response(
                Duration::from_millis(20),
                Duration::from_millis(7),
                &sorted,
            );
            stream.write_all(&response).unwrap();
        });

        let mut client = Client::connect("127.0.0.1", port).unwrap();
        let sorted = client.sort(&[3, -1, 6]).unwrap();
        assert_eq!(sorted, vec![-1, 3, 6]);
        assert_eq!(client.processing_time(), Duration::from_millis(20));
        assert_eq!(client.sort_time(), Duration::from_millis(7));

        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        // Port 1 is essentially never listening.
        assert!(matches!(
            Client::connect("127.0.0.1", 1),
            Err(Error::Connection(_))
        ));
    }

    #[test]
    fn test_drop_mid_exchange_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).unwrap();
            // Close without answering.
        });

        let mut client = Client::connect("127.0.0.1", port).unwrap();
        assert!(matches!(client.sort(&[1, 2, 3]), Err(Error::Io(_))));
        server.join().unwrap();
    }
}
