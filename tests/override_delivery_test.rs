//! Exercises the override manager's HTTP control-port delivery path against
//! a real, locally-bound fixture server — the one leg of the override story
//! a unit test can't reach, since it needs an actual socket on the other
//! end. The fixture server is brought up once via `ctor`, the same way the
//! application-under-test's own containers are brought up for its
//! integration suite, rather than per-test.
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use asserting::prelude::{AssertEquality, AssertOrder};
use asserting::assert_that;
use integr8::{AuthOverrideBuilder, OverrideBuilder, OverrideManager, OverrideType};
use serde_json::Value;

const CONTROL_PORT: u16 = 18181;
const OVERRIDE_ENDPOINT: &str = "/__test__/overrides";

static RECEIVED: OnceLock<Mutex<Vec<Value>>> = OnceLock::new();
static CLEAR_COUNT: OnceLock<Mutex<u32>> = OnceLock::new();
static SERVER_HANDLE: OnceLock<ServerHandle> = OnceLock::new();

fn received() -> &'static Mutex<Vec<Value>> {
    RECEIVED.get_or_init(|| Mutex::new(Vec::new()))
}

fn clear_count() -> &'static Mutex<u32> {
    CLEAR_COUNT.get_or_init(|| Mutex::new(0))
}

async fn receive_override(body: web::Json<Value>) -> HttpResponse {
    received().lock().expect("received lock poisoned").push(body.into_inner());
    HttpResponse::Ok().finish()
}

async fn clear_overrides() -> HttpResponse {
    *clear_count().lock().expect("clear count lock poisoned") += 1;
    HttpResponse::Ok().finish()
}

/// Starts the fixture server on a dedicated background thread with its own
/// actix runtime, mirroring the application-under-test's own `#[ctor]`
/// container bootstrap: tests must never race the server's startup.
#[ctor::ctor]
fn setup() {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async {
            let server = HttpServer::new(|| {
                App::new()
                    .route(OVERRIDE_ENDPOINT, web::post().to(receive_override))
                    .route("/__test__/overrides/clear", web::post().to(clear_overrides))
            })
            .bind(("127.0.0.1", CONTROL_PORT))
            .expect("fixture server failed to bind")
            .run();

            tx.send(server.handle()).expect("failed to hand off the fixture server handle");
            server.await.expect("fixture server crashed");
        });
    });

    let handle = rx.recv().expect("fixture server never signaled readiness");
    SERVER_HANDLE.set(handle).expect("setup ran more than once");
}

#[ctor::dtor]
fn teardown() {
    if let Some(handle) = SERVER_HANDLE.get() {
        actix_web::rt::System::new().block_on(handle.stop(true));
    }
}

fn manager() -> OverrideManager {
    OverrideManager::new(Some(CONTROL_PORT), Some(OVERRIDE_ENDPOINT))
}

/// Requests made against `OverrideManager`'s own `reqwest::Client` land on a
/// background event loop this test doesn't drive directly; give it a moment
/// to be processed before inspecting what the fixture server recorded.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn delivers_a_value_override_to_the_control_port() {
    let mut mgr = manager();
    let record = OverrideBuilder::new("payments.gateway", OverrideType::Service)
        .with_value(serde_json::json!({"mode": "sandbox"}));
    mgr.apply_override(record).await;
    settle().await;

    let matches = received()
        .lock()
        .expect("received lock poisoned")
        .iter()
        .filter(|v| v["name"] == "payments.gateway" && v["implementation"]["mode"] == "sandbox")
        .count();
    assert_that!(matches).is_equal_to(1);
}

#[tokio::test]
async fn delivers_an_admin_auth_override_with_its_role_list() {
    let mut mgr = manager();
    mgr.apply_override(AuthOverrideBuilder::new().as_admin()).await;
    settle().await;

    let matches = received()
        .lock()
        .expect("received lock poisoned")
        .iter()
        .filter(|v| v["name"] == "auth" && v["implementation"]["roles"] == serde_json::json!(["admin"]))
        .count();
    assert_that!(matches).is_equal_to(1);
}

#[tokio::test]
async fn clear_all_notifies_the_control_port() {
    let before = *clear_count().lock().expect("clear count lock poisoned");
    let mut mgr = manager();
    mgr.clear_all().await;
    settle().await;

    let after = *clear_count().lock().expect("clear count lock poisoned");
    assert_that!(after).is_greater_than(before);
}
