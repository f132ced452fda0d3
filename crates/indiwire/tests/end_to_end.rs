use std::time::Duration;

use indiwire::client::{connect, Condition, EventFilter, WaitOptions};
use indiwire::message::{State, SwitchState};
use indiwire::property::standard::{self, CONNECT, CONNECTION};
use indiwire::property::{DriverDef, EventKind, GroupDef};
use indiwire::router::{DriverHost, Router, ServerConfig, TcpServer, UpstreamProxy};

fn camera() -> DriverDef {
    DriverDef::new("CCD Simulator").group(GroupDef::new("Main Control").vector(standard::connection()))
}

fn options() -> WaitOptions {
    WaitOptions::with_timeout(Duration::from_secs(5)).without_polling()
}

async fn serve(router: &Router) -> String {
    let server = TcpServer::bind(
        router.clone(),
        ServerConfig {
            listen: "127.0.0.1:0".parse().expect("addr"),
            ..ServerConfig::default()
        },
    )
    .await
    .expect("bind");
    let addr = server.local_addr().expect("local addr").to_string();
    tokio::spawn(server.run());
    addr
}

#[tokio::test]
async fn client_switches_a_hosted_driver_over_tcp() {
    let router = Router::new();
    let host = DriverHost::attach(&router, camera()).expect("attach");
    host.driver()
        .element(CONNECTION, CONNECT)
        .expect("connect element")
        .subscribe(EventKind::Change, |event| {
            event.vector().set_state(State::Ok);
        });
    let addr = serve(&router).await;

    let connection = connect(&addr).await.expect("connect");
    let client = connection.client();
    client
        .wait_for_event(
            EventFilter::new()
                .device("CCD Simulator")
                .vector(CONNECTION)
                .kind(EventKind::Definition),
            Condition::check(|_| true),
            WaitOptions::with_timeout(Duration::from_secs(5)),
        )
        .await
        .expect("definition");

    client
        .set_new_value("CCD Simulator", CONNECTION, CONNECT, SwitchState::On)
        .expect("stage");
    let switched = client.wait_for_event(
        EventFilter::new()
            .device("CCD Simulator")
            .vector(CONNECTION)
            .element(CONNECT),
        Condition::value_equals(SwitchState::On),
        options(),
    );
    let settled = client.wait_for_event(
        EventFilter::new()
            .device("CCD Simulator")
            .vector(CONNECTION)
            .kind(EventKind::StateUpdate),
        Condition::state_equals(State::Ok),
        options(),
    );
    let (switched, settled, sent) = tokio::join!(switched, settled, async {
        client.submit("CCD Simulator", CONNECTION)
    });
    assert_eq!(sent.expect("submit"), 1);
    switched.expect("value change");
    settled.expect("state change");

    let mirrored = client.vector("CCD Simulator", CONNECTION).expect("mirrored");
    assert_eq!(mirrored.state, State::Ok);
    let connect_el = mirrored.element(CONNECT).expect("element");
    assert_eq!(connect_el.value, SwitchState::On.into());
    assert!(connect_el.pending.is_none());
    assert_eq!(
        host.driver().vector(CONNECTION).expect("vector").selected(),
        vec![CONNECT.to_string()]
    );

    connection.close();
}

#[tokio::test]
async fn chained_servers_relay_definitions() {
    let remote = Router::new();
    let _host = DriverHost::attach(&remote, camera()).expect("attach");
    let remote_addr = serve(&remote).await;

    let local = Router::new();
    let _proxy = UpstreamProxy::connect(&local, &remote_addr)
        .await
        .expect("upstream");
    let local_addr = serve(&local).await;

    let connection = connect(&local_addr).await.expect("connect");
    connection
        .client()
        .wait_for_event(
            EventFilter::new()
                .device("CCD Simulator")
                .kind(EventKind::Definition),
            Condition::check(|_| true),
            WaitOptions::with_timeout(Duration::from_secs(5)),
        )
        .await
        .expect("relayed definition");
    assert!(connection.client().device("CCD Simulator").is_some());
    assert!(!connection.is_closed());
    connection.close();
}
