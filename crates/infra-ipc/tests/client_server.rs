use std::sync::Arc;

use async_trait::async_trait;
use infra_core::{ErrorCode, MachineId, MachineRef, PROTOCOL_VERSION, Request, Response};
use infra_ipc::{ControlClient, IpcError, RequestHandler, serve_unix};
use tempfile::tempdir;
use tokio::time::{Duration, sleep};

struct TestHandler;

#[async_trait]
impl RequestHandler for TestHandler {
    async fn handle(&self, req: Request) -> Response {
        match req {
            Request::Version {} => Response::Version {
                daemon: "0.1.0".to_string(),
                protocol: PROTOCOL_VERSION,
            },
            Request::Health {} => Response::Health {
                status: "ok".to_string(),
            },
            Request::CreateMachine { machine } => Response::MachineCreated {
                provider_id: format!("{}:///{}", machine.provider, machine.machine_id),
                node_name: machine.machine_id.0,
                error: 0,
            },
            Request::ListDrivers {} | Request::DeleteMachine { .. } => Response::Error {
                code: ErrorCode::InvalidRequest,
                message: "unsupported in test".to_string(),
                detail: None,
            },
        }
    }
}

async fn connect_with_retry(path: &std::path::Path) -> ControlClient {
    for _ in 0..200 {
        match ControlClient::connect(path).await {
            Ok(client) => return client,
            Err(IpcError::Io(_)) => sleep(Duration::from_millis(10)).await,
            Err(err) => panic!("client should connect: {err}"),
        }
    }
    panic!("client should connect");
}

#[tokio::test]
async fn control_calls_roundtrip() {
    let tmp = tempdir().expect("tempdir should be created");
    let socket_path = tmp.path().join("infrad.sock");

    let handler = Arc::new(TestHandler);
    let server_socket = socket_path.clone();
    let server = tokio::spawn(async move { serve_unix(&server_socket, handler).await });

    let mut client = connect_with_retry(&socket_path).await;

    match client.call(Request::Version {}).await.expect("version call") {
        Response::Version { protocol, .. } => assert_eq!(protocol, PROTOCOL_VERSION),
        other => panic!("unexpected response: {other:?}"),
    }

    let created = client
        .call(Request::CreateMachine {
            machine: MachineRef {
                provider: "azure".to_string(),
                machine_class: "small".to_string(),
                machine_id: MachineId("m-1".to_string()),
            },
        })
        .await
        .expect("create call");
    assert_eq!(
        created,
        Response::MachineCreated {
            provider_id: "azure:///m-1".to_string(),
            node_name: "m-1".to_string(),
            error: 0,
        }
    );

    match client.call(Request::ListDrivers {}).await.expect("list call") {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidRequest),
        other => panic!("unexpected response: {other:?}"),
    }

    server.abort();
}
