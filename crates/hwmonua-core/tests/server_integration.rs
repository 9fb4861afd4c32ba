//! End-to-end tests of the run-loop through the HTTP transport.
//!
//! Run with: cargo test -p hwmonua-core --test server_integration

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hwmonua_core::address_space::DataSourceVariable;
use hwmonua_core::types::ns0;
use hwmonua_core::{
    AccessLevel, DataSource, DataValue, DenyListAccessControl, LocalizedText, NodeId,
    QualifiedName, ReadContext, RunningFlag, Server, ServerConfig, StatusCode,
    VariableAttributes, Variant,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct Constant {
    value: f64,
    reads: Arc<AtomicUsize>,
}

impl DataSource for Constant {
    fn read(&self, ctx: &ReadContext<'_>) -> Result<DataValue, StatusCode> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut value = DataValue::from(Variant::Double(self.value));
        if ctx.source_timestamp {
            value.source_timestamp = Some(chrono::Utc::now());
        }
        Ok(value)
    }
}

fn variable(name: &str, value: f64, reads: Arc<AtomicUsize>) -> DataSourceVariable {
    DataSourceVariable {
        node_id: NodeId::string(1, name),
        parent: NodeId::objects_folder(),
        reference_type: NodeId::ns0(ns0::ORGANIZES),
        browse_name: QualifiedName::new(1, name),
        type_definition: NodeId::ns0(ns0::BASE_DATA_VARIABLE_TYPE),
        attributes: VariableAttributes {
            display_name: LocalizedText::en_us(name),
            access_level: AccessLevel::CURRENT_READ,
            data_type: NodeId::ns0(ns0::DOUBLE),
            ..VariableAttributes::default()
        },
        data_source: Box::new(Constant { value, reads }),
    }
}

struct Running {
    addr: SocketAddr,
    running: RunningFlag,
    handle: JoinHandle<StatusCode>,
}

async fn start(server: Server) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = RunningFlag::new();
    let handle = {
        let running = running.clone();
        tokio::spawn(async move { server.run_with_listener(listener, running).await })
    };
    Running {
        addr,
        running,
        handle,
    }
}

async fn stop(server: Running) -> StatusCode {
    server.running.stop();
    tokio::time::timeout(Duration::from_secs(2), server.handle)
        .await
        .expect("run-loop did not exit")
        .unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    (status, serde_json::from_str(body).unwrap())
}

#[tokio::test]
async fn test_read_sensor_value() {
    let reads = Arc::new(AtomicUsize::new(0));
    let mut server = Server::new(ServerConfig::minimal(0, None)).unwrap();
    server
        .address_space_mut()
        .add_data_source_variable(variable("coretemp-isa-0000_temp1_input", 45.0, reads.clone()))
        .unwrap();
    let server = start(server).await;

    let (status, body) = get(
        server.addr,
        "/nodes/ns=1;s=coretemp-isa-0000_temp1_input?timestamps=both",
    )
    .await;

    // Verify the payload and both timestamps came back
    assert_eq!(status, 200);
    assert_eq!(body["status"], "Good");
    assert_eq!(body["data_value"]["value"]["type"], "Double");
    assert_eq!(body["data_value"]["value"]["value"], 45.0);
    assert!(body["data_value"]["source_timestamp"].is_string());
    assert!(body["data_value"]["server_timestamp"].is_string());
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    assert_eq!(stop(server).await, StatusCode::GOOD);
}

#[tokio::test]
async fn test_source_timestamp_omitted_when_not_requested() {
    let reads = Arc::new(AtomicUsize::new(0));
    let mut server = Server::new(ServerConfig::minimal(0, None)).unwrap();
    server
        .address_space_mut()
        .add_data_source_variable(variable("chip_fan1_input", 1200.0, reads))
        .unwrap();
    let server = start(server).await;

    let (_, body) = get(server.addr, "/nodes/1:chip_fan1_input?timestamps=server").await;

    assert_eq!(body["data_value"]["value"]["value"], 1200.0);
    assert!(body["data_value"].get("source_timestamp").is_none());
    assert!(body["data_value"]["server_timestamp"].is_string());

    stop(server).await;
}

#[tokio::test]
async fn test_denied_node_never_reaches_data_source() {
    let reads = Arc::new(AtomicUsize::new(0));
    let config = ServerConfig::minimal(0, None).with_access_control(Arc::new(
        DenyListAccessControl::new([NodeId::string(1, "secret")]),
    ));
    let mut server = Server::new(config).unwrap();
    server
        .address_space_mut()
        .add_data_source_variable(variable("secret", 1.0, reads.clone()))
        .unwrap();
    let server = start(server).await;

    let (status, body) = get(server.addr, "/nodes/ns=1;s=secret").await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "BadUserAccessDenied");
    assert!(body.get("data_value").is_none());
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    stop(server).await;
}

#[tokio::test]
async fn test_browse_and_info() {
    let mut server = Server::new(ServerConfig::minimal(0, Some(b"cert".to_vec()))).unwrap();
    for name in ["a_in0_input", "a_in1_input"] {
        server
            .address_space_mut()
            .add_data_source_variable(variable(name, 0.0, Arc::default()))
            .unwrap();
    }
    let server = start(server).await;

    let (status, browse) = get(server.addr, "/nodes").await;
    assert_eq!(status, 200);
    let names: Vec<_> = browse["references"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["node_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["ns=1;s=a_in0_input", "ns=1;s=a_in1_input"]);

    let (_, info) = get(server.addr, "/").await;
    assert_eq!(info["security_mode"], "None");
    assert_eq!(info["node_count"], 3);
    assert_eq!(
        info["certificate_thumbprint"],
        "06298432e8066b29e2223bcc23aa9504b56ae508fabf3435508869b9c3190e22"
    );

    stop(server).await;
}

#[tokio::test]
async fn test_unknown_node_and_bad_range() {
    let mut server = Server::new(ServerConfig::minimal(0, None)).unwrap();
    server
        .address_space_mut()
        .add_data_source_variable(variable("x_temp1_input", 1.0, Arc::default()))
        .unwrap();
    let server = start(server).await;

    let (_, body) = get(server.addr, "/nodes/ns=1;s=missing").await;
    assert_eq!(body["status"], "BadNodeIdUnknown");

    for range in ["5:2", "abc"] {
        let uri = format!("/nodes/ns=1;s=x_temp1_input?index_range={}", range);
        let (_, body) = get(server.addr, &uri).await;
        assert_eq!(body["status"], "Good");
        assert_eq!(body["data_value"]["status"], "BadIndexRangeInvalid");
        assert!(body["data_value"].get("value").is_none());
    }

    stop(server).await;
}
