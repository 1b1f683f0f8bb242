//! Helpers to drive the built binaries in integration tests.
#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpStream,
    process::{Child, ChildStdout, Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};

pub struct Running {
    pub child: Child,
    pub port: u16,
    stdout: BufReader<ChildStdout>,
}

/// Starts `binary` on an ephemeral loopback port and waits for its
/// "listening on port" log line.
pub fn spawn(binary: &str) -> Running {
    let mut child = Command::new(binary)
        .args(["0", "--host", "127.0.0.1"])
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("binary should start");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout is piped"));

    let marker = "listening on port ";
    let mut line = String::new();
    let port = loop {
        line.clear();
        let read = stdout.read_line(&mut line).expect("stdout is readable");
        assert_ne!(read, 0, "server exited before listening");
        if let Some(position) = line.find(marker) {
            let digits: String = line[position + marker.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            break digits.parse().expect("port in log line");
        }
    };

    Running {
        child,
        port,
        stdout,
    }
}

impl Running {
    /// Sends a raw request and returns the response head and body.
    pub fn request(&self, raw: &str) -> (String, String) {
        request(self.port, raw)
    }

    /// Sends `signal` to the process and waits for it to exit, returning the
    /// exit status and everything it logged afterwards.
    pub fn stop(mut self, signal: &str) -> (ExitStatus, String) {
        let status = Command::new("kill")
            .args([format!("-{signal}"), self.child.id().to_string()])
            .status()
            .expect("kill should run");
        assert!(status.success());

        let deadline = Instant::now() + Duration::from_secs(10);
        let status = loop {
            if let Some(status) = self.child.try_wait().expect("child can be waited") {
                break status;
            }
            assert!(Instant::now() < deadline, "server did not stop");
            std::thread::sleep(Duration::from_millis(20));
        };

        let mut rest = String::new();
        let _ = self.stdout.read_to_string(&mut rest);
        (status, rest)
    }
}

/// Sends a raw request to a server on the loopback interface and returns
/// the response head and body.
pub fn request(port: u16, raw: &str) -> (String, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("server accepts");
    stream.write_all(raw.as_bytes()).expect("request is sent");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .expect("response is read");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("response has a header section");
    (head.to_string(), body.to_string())
}

pub fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .expect("Content-Length header")
        .parse()
        .expect("numeric Content-Length")
}
