//! End-to-end tests driving full bank nodes over real sockets.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use bankd_config::BankConfig;
use bankd_p2p::Bank;
use bankd_storage::{EngineType, Store};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

fn test_config(host: Ipv4Addr, port: u16) -> BankConfig {
    BankConfig {
        host,
        port,
        storage_path: "memory".to_string(),
        storage_timeout: 5.0,
        bank_workers: 2,
        client_timeout: 5.0,
        max_requests_per_minute: 1000,
        max_bad_commands: 100,
        ban_duration: 60,
        network_scan_port_range: [port, port],
        network_scan_subnet: "127.0.0".to_string(),
        network_timeout: 1.0,
    }
}

async fn start_bank(config: BankConfig) -> Arc<Bank> {
    let address = format!("{}:{}", config.host, config.port);
    let store = Store::new("", EngineType::InMemory).expect("create store");
    let bank = Arc::new(Bank::new(config, store));

    let server = bank.clone();
    tokio::spawn(async move { server.open().await });

    for _ in 0..100 {
        if TcpStream::connect(&address).await.is_ok() {
            return bank;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bank at {address} never came up");
}

async fn connect(address: &str) -> TcpStream {
    TcpStream::connect(address).await.expect("connect to bank")
}

async fn request(stream: &mut TcpStream, command: &str) -> String {
    stream
        .write_all(format!("{command}\r\n").as_bytes())
        .await
        .expect("write command");
    read_reply(stream).await
}

async fn read_reply(stream: &mut TcpStream) -> String {
    let mut buffer = [0u8; 1024];
    let read = stream.read(&mut buffer).await.expect("read reply");
    String::from_utf8_lossy(&buffer[..read]).trim().to_string()
}

#[tokio::test]
async fn account_lifecycle_over_the_wire() {
    let _bank = start_bank(test_config(Ipv4Addr::LOCALHOST, 56701)).await;
    let mut stream = connect("127.0.0.1:56701").await;

    assert_eq!(request(&mut stream, "BC").await, "BC 127.0.0.1");

    let created = request(&mut stream, "AC").await;
    let address = created.strip_prefix("AC ").expect("AC response");
    assert!(address.ends_with("/127.0.0.1"));

    assert_eq!(request(&mut stream, &format!("AB {address}")).await, "AB 0");
    assert_eq!(
        request(&mut stream, &format!("AD {address} 500")).await,
        "AD"
    );
    assert_eq!(
        request(&mut stream, &format!("AW {address} 200")).await,
        "AW"
    );
    assert_eq!(
        request(&mut stream, &format!("AB {address}")).await,
        "AB 300"
    );
    assert_eq!(request(&mut stream, "BA").await, "BA 300");
    assert_eq!(request(&mut stream, "BN").await, "BN 1");
}

#[tokio::test]
async fn state_and_protocol_errors_over_the_wire() {
    let _bank = start_bank(test_config(Ipv4Addr::LOCALHOST, 56702)).await;
    let mut stream = connect("127.0.0.1:56702").await;

    // No account was ever created on this node.
    assert_eq!(
        request(&mut stream, "AW 10000/127.0.0.1 1").await,
        "ER Account not found"
    );
    assert_eq!(
        request(&mut stream, "XYZ").await,
        "ER Invalid command"
    );
    assert_eq!(
        request(&mut stream, "AD 12345/127.0.0.1").await,
        "ER invalid arguments"
    );
    // A foreign address turns the request into a relay, and only AD/AW/AB
    // may be relayed.
    assert_eq!(
        request(&mut stream, "AR 12345/10.99.99.99").await,
        "ER Command cannot be proxied"
    );

    let created = request(&mut stream, "AC").await;
    let address = created.strip_prefix("AC ").expect("AC response");
    request(&mut stream, &format!("AD {address} 100")).await;
    assert_eq!(
        request(&mut stream, &format!("AW {address} 999999")).await,
        "ER Lack of funds"
    );
}

#[tokio::test]
async fn rate_limit_bans_and_later_connections_are_rejected() {
    let mut config = test_config(Ipv4Addr::LOCALHOST, 56703);
    config.max_requests_per_minute = 3;
    let _bank = start_bank(config).await;

    let mut stream = connect("127.0.0.1:56703").await;
    for _ in 0..3 {
        assert_eq!(request(&mut stream, "BC").await, "BC 127.0.0.1");
    }
    assert_eq!(
        request(&mut stream, "BC").await,
        "ER Rate limit exceeded"
    );

    // The ban outlives the connection.
    let mut stream = connect("127.0.0.1:56703").await;
    assert_eq!(request(&mut stream, "BC").await, "ER Banned");
}

#[tokio::test]
async fn repeated_bad_commands_ban_the_client() {
    let mut config = test_config(Ipv4Addr::LOCALHOST, 56704);
    config.max_bad_commands = 2;
    let _bank = start_bank(config).await;

    let mut stream = connect("127.0.0.1:56704").await;
    assert_eq!(request(&mut stream, "NOPE").await, "ER Invalid command");
    assert_eq!(request(&mut stream, "NOPE").await, "ER Too many errors.");

    let mut stream = connect("127.0.0.1:56704").await;
    assert_eq!(request(&mut stream, "BC").await, "ER Banned");
}

#[tokio::test]
async fn commands_for_a_peer_bank_are_relayed() {
    // The peer binds a second loopback address so the two nodes have
    // distinct bank codes.
    let peer_host = Ipv4Addr::new(127, 0, 0, 2);
    let _peer = start_bank(test_config(peer_host, 56706)).await;

    let mut config = test_config(Ipv4Addr::LOCALHOST, 56705);
    config.network_scan_port_range = [56706, 56708];
    let _bank = start_bank(config).await;

    // Open the account directly on the peer.
    let mut peer_stream = connect("127.0.0.2:56706").await;
    let created = request(&mut peer_stream, "AC").await;
    let address = created.strip_prefix("AC ").expect("AC response");
    assert!(address.ends_with("/127.0.0.2"));

    // Drive it through the local node; every reply comes from the peer.
    let mut stream = connect("127.0.0.1:56705").await;
    assert_eq!(request(&mut stream, &format!("AB {address}")).await, "AB 0");
    assert_eq!(
        request(&mut stream, &format!("AD {address} 250")).await,
        "AD"
    );
    assert_eq!(
        request(&mut stream, &format!("AB {address}")).await,
        "AB 250"
    );
}

#[tokio::test]
async fn stats_reflect_served_accounts() {
    let bank = start_bank(test_config(Ipv4Addr::LOCALHOST, 56709)).await;
    let mut stream = connect("127.0.0.1:56709").await;

    let created = request(&mut stream, "AC").await;
    let address = created.strip_prefix("AC ").expect("AC response");
    request(&mut stream, &format!("AD {address} 700")).await;

    let stats = bank.stats().await;
    assert_eq!(stats.bank_code, "127.0.0.1");
    assert_eq!(stats.total_amount, 700);
    assert_eq!(stats.client_count, 1);

    assert_eq!(bank.accounts_count().await, 1);
    let page = bank.accounts_paged(0, 10).await;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].1, 700);
    assert_eq!(bank.gateway_address(), "127.0.0.1:56709");
    assert!(bank.start_time().is_some());
}
