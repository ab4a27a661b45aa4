//! Integration tests over a real socket: spawn the daemon, connect IRC
//! clients, and drive RESV end to end.

use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

/// A daemon instance under test.
struct TestServer {
    child: Child,
    port: u16,
    data_dir: PathBuf,
}

impl TestServer {
    async fn spawn(port: u16) -> anyhow::Result<Self> {
        let data_dir = std::env::temp_dir().join(format!("corvidd-test-{}", port));
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join("config.toml");
        let config = format!(
            r#"
[server]
name = "test.example.net"
sid = "0TS"
description = "Test node"

[listen]
client = "127.0.0.1:{port}"

[database]
path = "{}/bans.db"

[[oper]]
name = "testop"
password = "testpass"
resv = true
remote_ban = true
"#,
            data_dir.display()
        );
        std::fs::write(&config_path, config)?;

        let child = std::process::Command::new(env!("CARGO_BIN_EXE_corvidd"))
            .arg(config_path.to_str().unwrap())
            .spawn()?;

        let server = Self {
            child,
            port,
            data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..30 {
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 3 seconds")
    }

    async fn connect(&self, nick: &str) -> anyhow::Result<TestClient> {
        TestClient::connect(self.port, nick).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

/// A raw-line IRC client.
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestClient {
    async fn connect(port: u16, nick: &str) -> anyhow::Result<TestClient> {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let (read, writer) = stream.into_split();
        let mut client = TestClient {
            reader: BufReader::new(read),
            writer,
        };
        client.send(&format!("NICK {nick}")).await?;
        client
            .send(&format!("USER {nick} 0 * :{nick}"))
            .await?;
        client
            .recv_until(|line| numeric_of(line) == Some(1))
            .await?;
        Ok(client)
    }

    async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await?;
        Ok(())
    }

    /// Read lines until one satisfies the predicate; returns everything
    /// read. Fails after five seconds.
    async fn recv_until(
        &mut self,
        predicate: impl Fn(&str) -> bool,
    ) -> anyhow::Result<Vec<String>> {
        let mut seen = Vec::new();
        let deadline = Duration::from_secs(5);
        loop {
            let mut line = String::new();
            let n = timeout(deadline, self.reader.read_line(&mut line)).await??;
            if n == 0 {
                anyhow::bail!("connection closed; saw {seen:?}");
            }
            let line = line.trim_end().to_string();
            let done = predicate(&line);
            seen.push(line);
            if done {
                return Ok(seen);
            }
        }
    }
}

/// Numeric code of a server reply line, if it is one.
fn numeric_of(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

async fn become_oper(client: &mut TestClient) -> anyhow::Result<()> {
    client.send("OPER testop testpass").await?;
    client
        .recv_until(|line| numeric_of(line) == Some(381))
        .await?;
    Ok(())
}

#[tokio::test]
async fn oper_places_and_lifts_a_channel_resv() {
    let server = TestServer::spawn(17870).await.expect("spawn server");
    let mut oper = server.connect("alice").await.expect("connect oper");
    become_oper(&mut oper).await.expect("oper up");

    oper.send("RESV #spam ON test.example.net :spam channel")
        .await
        .unwrap();
    oper.recv_until(|line| line.contains("Added RESV [#spam]"))
        .await
        .expect("RESV confirmation");

    // The duplicate is refused.
    oper.send("RESV #spam ON test.example.net :again").await.unwrap();
    oper.recv_until(|line| line.contains("A RESV has already been placed on channel: #spam"))
        .await
        .expect("duplicate notice");

    oper.send("UNRESV #spam ON test.example.net").await.unwrap();
    oper.recv_until(|line| line.contains("RESV for [#spam] is removed"))
        .await
        .expect("UNRESV confirmation");
}

#[tokio::test]
async fn reserved_nick_mask_blocks_registration() {
    let server = TestServer::spawn(17871).await.expect("spawn server");
    let mut oper = server.connect("alice").await.expect("connect oper");
    become_oper(&mut oper).await.expect("oper up");

    oper.send("RESV 10 Evil* ON test.example.net :abuse")
        .await
        .unwrap();
    oper.recv_until(|line| line.contains("Added temporary 10 min. RESV [Evil*]"))
        .await
        .expect("temp RESV confirmation");

    // A client trying to register under the reserved mask is refused.
    let stream = TcpStream::connect(("127.0.0.1", server.port)).await.unwrap();
    let (read, writer) = stream.into_split();
    let mut victim = TestClient {
        reader: BufReader::new(read),
        writer,
    };
    victim.send("NICK EvilGuy").await.unwrap();
    victim
        .recv_until(|line| numeric_of(line) == Some(432))
        .await
        .expect("ERR_ERRONEUSNICKNAME for reserved nick");

    // An unreserved nick goes through.
    victim.send("NICK Goodguy").await.unwrap();
    victim.send("USER g 0 * :g").await.unwrap();
    victim
        .recv_until(|line| numeric_of(line) == Some(1))
        .await
        .expect("welcome for unreserved nick");
}

#[tokio::test]
async fn non_oper_resv_is_denied() {
    let server = TestServer::spawn(17872).await.expect("spawn server");
    let mut client = server.connect("mallory").await.expect("connect");

    client.send("RESV 60 Evil* :abuse").await.unwrap();
    client
        .recv_until(|line| numeric_of(line) == Some(723))
        .await
        .expect("ERR_NOPRIVS");
}

#[tokio::test]
async fn names_lists_channelless_users_in_global_sweep() {
    let server = TestServer::spawn(17873).await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect alice");
    let _bob = server.connect("bob").await.expect("connect bob");

    // No channels exist; the global sweep lists both clients under "* *".
    alice.send("NAMES").await.unwrap();
    let lines = alice
        .recv_until(|line| numeric_of(line) == Some(366))
        .await
        .expect("end of names");
    let sweep: Vec<&String> = lines
        .iter()
        .filter(|l| numeric_of(l) == Some(353))
        .collect();
    assert!(
        sweep.iter().any(|l| l.contains("alice") || l.contains("bob")),
        "global NAMES should list channelless users: {lines:?}"
    );

    // A named but nonexistent channel just ends the list.
    alice.send("NAMES #nowhere").await.unwrap();
    alice
        .recv_until(|line| numeric_of(line) == Some(366) && line.contains("#nowhere"))
        .await
        .expect("end of names for empty channel");
}
