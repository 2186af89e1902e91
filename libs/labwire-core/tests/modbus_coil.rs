//! Modbus coil drivers against an in-process coil server

#![allow(clippy::disallowed_methods)]

use labwire_core::error::CoilAction;
use labwire_core::prelude::*;
use labwire_protocols::modbus::constants::{
    FC_READ_COILS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_SINGLE_COIL,
};
use labwire_protocols::test_utils::FakeCoilServer;
use std::sync::Arc;

fn fast_proxy() -> DispatchProxy {
    DispatchProxy::new(DispatchConfig {
        modbus_timeout_ms: 500,
        ..Default::default()
    })
}

fn coil(server: &FakeCoilServer, coil: u16, invert: bool, multiple: bool) -> CoilAddress {
    CoilAddress {
        host: format!("127.0.0.1:{}", server.port()),
        coil,
        invert,
        write_multiple_coils: multiple,
    }
}

fn protocol_error(err: DispatchError) -> CoilProtocolError {
    match err {
        DispatchError::Protocol(err) => err,
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_set_get_round_trip() {
    let server = FakeCoilServer::start(vec![false; 8]).await.unwrap();
    let descriptor = Arc::new(
        ResourceDescriptor::local(
            "relay-3",
            Technology::ModbusCoil(coil(&server, 3, false, false)),
        )
        .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();

    output.activate().await.unwrap();
    output.set(true).await.unwrap();
    assert!(server.coils()[3]);
    assert!(output.get().await.unwrap());

    output.set(false).await.unwrap();
    assert!(!server.coils()[3]);
    assert!(!output.get().await.unwrap());

    assert_eq!(
        server.function_codes(),
        vec![
            FC_WRITE_SINGLE_COIL,
            FC_READ_COILS,
            FC_WRITE_SINGLE_COIL,
            FC_READ_COILS
        ]
    );
    output.deactivate().await.unwrap();
}

#[tokio::test]
async fn test_inverted_coil() {
    let server = FakeCoilServer::start(vec![false; 4]).await.unwrap();
    let descriptor = Arc::new(
        ResourceDescriptor::local(
            "inverted",
            Technology::ModbusCoil(coil(&server, 1, true, false)),
        )
        .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();
    output.activate().await.unwrap();

    output.set(true).await.unwrap();
    assert!(!server.coils()[1]);
    assert!(output.get().await.unwrap());

    server.set_coil(1, true);
    assert!(!output.get().await.unwrap());
}

#[tokio::test]
async fn test_write_multiple_coils_flag() {
    let server = FakeCoilServer::start(vec![false; 8]).await.unwrap();
    let descriptor = Arc::new(
        ResourceDescriptor::local(
            "fc15",
            Technology::ModbusCoil(coil(&server, 5, false, true)),
        )
        .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();
    output.activate().await.unwrap();

    output.set(true).await.unwrap();
    assert_eq!(server.function_codes(), vec![FC_WRITE_MULTIPLE_COILS]);
    assert_eq!(
        server.coils(),
        vec![false, false, false, false, false, true, false, false]
    );
}

#[tokio::test]
async fn test_waveshare_batch_read() {
    let server = FakeCoilServer::start(vec![false, true, true, false])
        .await
        .unwrap();

    let plain = Arc::new(
        ResourceDescriptor::local(
            "bank-2",
            Technology::WaveshareModbusCoil {
                address: coil(&server, 2, false, false),
                coil_count: 4,
            },
        )
        .unwrap(),
    );
    let mut output = bind_driver(plain, fast_proxy()).unwrap();
    output.activate().await.unwrap();
    assert!(output.get().await.unwrap());
    output.deactivate().await.unwrap();

    let inverted = Arc::new(
        ResourceDescriptor::local(
            "bank-2-inverted",
            Technology::WaveshareModbusCoil {
                address: coil(&server, 2, true, false),
                coil_count: 4,
            },
        )
        .unwrap(),
    );
    let mut output = bind_driver(inverted, fast_proxy()).unwrap();
    output.activate().await.unwrap();
    assert!(!output.get().await.unwrap());
    output.deactivate().await.unwrap();

    assert_eq!(server.function_codes(), vec![FC_READ_COILS, FC_READ_COILS]);
}

#[tokio::test]
async fn test_waveshare_coil_out_of_range() {
    let err = ResourceDescriptor::local(
        "bank-4",
        Technology::WaveshareModbusCoil {
            address: CoilAddress {
                host: "relay-board".to_string(),
                coil: 4,
                invert: false,
                write_multiple_coils: false,
            },
            coil_count: 4,
        },
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::Configuration { .. }));
}

#[tokio::test]
async fn test_exception_response_is_decoded() {
    let server = FakeCoilServer::start(vec![false; 2]).await.unwrap();
    let descriptor = Arc::new(
        ResourceDescriptor::local(
            "missing",
            Technology::ModbusCoil(coil(&server, 9, false, false)),
        )
        .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();
    output.activate().await.unwrap();

    let err = protocol_error(output.get().await.unwrap_err());
    assert_eq!(err.action, CoilAction::Read);
    assert_eq!(err.code, 7);
    assert_eq!(err.exception, Some(2));
    assert!(err.message.contains("exception"));

    let err = protocol_error(output.set(true).await.unwrap_err());
    assert_eq!(err.action, CoilAction::Write);
    assert_eq!(err.exception, Some(2));
}

#[tokio::test]
async fn test_acknowledge_carries_code_only() {
    let server = FakeCoilServer::start(vec![false; 2]).await.unwrap();
    server.respond_with_exception(Some(5));
    let descriptor = Arc::new(
        ResourceDescriptor::local("ack", Technology::ModbusCoil(coil(&server, 0, false, false)))
            .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();
    output.activate().await.unwrap();

    let err = protocol_error(output.set(true).await.unwrap_err());
    assert_eq!(err.code, 7);
    assert_eq!(err.exception, None);
    assert_eq!(err.message, "Could not write coil (code=7)");
}

#[tokio::test]
async fn test_closed_connection() {
    let server = FakeCoilServer::start(vec![false; 2]).await.unwrap();
    server.drop_requests(true);
    let descriptor = Arc::new(
        ResourceDescriptor::local("gone", Technology::ModbusCoil(coil(&server, 0, false, false)))
            .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();
    output.activate().await.unwrap();

    let err = protocol_error(output.get().await.unwrap_err());
    assert_eq!(err.code, 9);
    assert_eq!(err.exception, None);
}

#[tokio::test]
async fn test_coil_is_exclusive_per_proxy() {
    let server = FakeCoilServer::start(vec![false; 4]).await.unwrap();
    let proxy = fast_proxy();
    let technology = Technology::ModbusCoil(coil(&server, 2, false, false));

    let first = Arc::new(ResourceDescriptor::local("first", technology.clone()).unwrap());
    let second = Arc::new(ResourceDescriptor::local("second", technology).unwrap());

    let mut a = bind_driver(first, proxy.clone()).unwrap();
    let mut b = bind_driver(second, proxy.clone()).unwrap();

    a.activate().await.unwrap();
    let err = b.activate().await.unwrap_err();
    assert!(matches!(err, DispatchError::Connection { .. }));
    assert!(!b.is_active());

    a.deactivate().await.unwrap();
    assert!(proxy.ownership().is_empty());
    b.activate().await.unwrap();
    assert!(b.is_active());
}

#[tokio::test]
async fn test_unreachable_device_reports_connect_error() {
    // Bind and drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let descriptor = Arc::new(
        ResourceDescriptor::local(
            "nowhere",
            Technology::ModbusCoil(CoilAddress {
                host: format!("127.0.0.1:{}", port),
                coil: 0,
                invert: false,
                write_multiple_coils: false,
            }),
        )
        .unwrap(),
    );
    let mut output = bind_driver(descriptor, fast_proxy()).unwrap();
    output.activate().await.unwrap();

    let err = protocol_error(output.set(true).await.unwrap_err());
    assert_eq!(err.code, 2);
    assert_eq!(err.message, "Could not write coil (code=2)");
}
