#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use central_stores::{
    config::{AppConfig, WorkflowConfig},
    db,
    entities::user::{self, Department, Role},
    events::{self, EventSender},
    ledger::{ContractCall, LedgerClient, LedgerError, LedgerEventKind, RawLedgerEvent},
    notifications::{NewNotification, NotificationError, NotificationKind, Notifier},
    services::users::NewUser,
    AppState,
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const DEAN_ADDRESS: &str = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1";

/// `0x` + 64 hex digits derived from `n`
pub fn tx_hash(n: u64) -> String {
    format!("0x{:064x}", n)
}

#[derive(Default)]
struct LedgerState {
    latest_block: u64,
    events: Vec<RawLedgerEvent>,
    fail_fetch: Option<String>,
    fail_from_block: Option<u64>,
    fail_latest: bool,
    fetch_ranges: Vec<(u64, u64)>,
    submitted: Vec<(ContractCall, String)>,
}

/// In-memory chain node.
pub struct FakeLedger {
    configured: bool,
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            configured: true,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn set_latest_block(&self, block: u64) {
        self.state.lock().unwrap().latest_block = block;
    }

    pub fn push_event(&self, kind: LedgerEventKind, hash: String, block: u64, log_index: u32) {
        let mut args = Map::new();
        args.insert("source".into(), Value::String("fake".into()));
        let mut state = self.state.lock().unwrap();
        state.events.push(RawLedgerEvent {
            kind,
            transaction_hash: hash,
            block_number: block,
            log_index,
            args,
        });
        state.latest_block = state.latest_block.max(block);
    }

    pub fn fail_fetches(&self, reason: &str) {
        self.state.lock().unwrap().fail_fetch = Some(reason.to_string());
    }

    /// Fails any fetch whose range reaches `block`.
    pub fn fail_from_block(&self, block: u64) {
        self.state.lock().unwrap().fail_from_block = Some(block);
    }

    pub fn fail_latest_block(&self, fail: bool) {
        self.state.lock().unwrap().fail_latest = fail;
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_fetch = None;
        state.fail_from_block = None;
        state.fail_latest = false;
    }

    /// Block ranges requested so far, one entry per poll of the first event kind
    pub fn polled_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().fetch_ranges.clone()
    }

    pub fn submitted(&self) -> Vec<(ContractCall, String)> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Waits for background emissions to land.
    pub async fn wait_for_submissions(&self, count: usize) -> Vec<(ContractCall, String)> {
        for _ in 0..100 {
            let submitted = self.submitted();
            if submitted.len() >= count {
                return submitted;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.submitted()
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn latest_block_number(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().unwrap();
        if state.fail_latest {
            return Err(LedgerError::Transport("node unreachable".into()));
        }
        Ok(state.latest_block)
    }

    async fn fetch_events(
        &self,
        kind: LedgerEventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLedgerEvent>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if kind == LedgerEventKind::RoleAssigned {
            state.fetch_ranges.push((from_block, to_block));
        }
        if let Some(reason) = &state.fail_fetch {
            return Err(LedgerError::Transport(reason.clone()));
        }
        if state.fail_from_block.is_some_and(|block| to_block >= block) {
            return Err(LedgerError::Transport("getLogs range rejected".into()));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| e.kind == kind && e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn submit_transaction(
        &self,
        call: &ContractCall,
        sender: &str,
    ) -> Result<String, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push((call.clone(), sender.to_string()));
        Ok(tx_hash(state.submitted.len() as u64))
    }

    fn contract_configured(&self) -> bool {
        self.configured
    }
}

/// Keeps every notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NewNotification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<NewNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<NewNotification> {
        self.sent().into_iter().filter(|n| n.kind == kind).collect()
    }

    pub fn for_user(&self, user_id: Uuid) -> Vec<NewNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError> {
        if *self.failing.lock().unwrap() {
            return Err(NotificationError::Delivery("smtp down".into()));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Application wired to a fresh in-memory database.
pub struct TestContext {
    pub state: AppState,
    pub ledger: Arc<FakeLedger>,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::build(WorkflowConfig::default(), FakeLedger::new()).await
    }

    pub async fn with_workflow(workflow: WorkflowConfig) -> Self {
        Self::build(workflow, FakeLedger::new()).await
    }

    pub async fn with_ledger(ledger: FakeLedger) -> Self {
        Self::build(WorkflowConfig::default(), ledger).await
    }

    async fn build(workflow: WorkflowConfig, ledger: FakeLedger) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection, so every query sees the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.ledger.submit_timeout_secs = 1;
        cfg.ledger.request_timeout_secs = 1;
        cfg.listener.max_block_span = 10;
        cfg.workflow = workflow;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let ledger = Arc::new(ledger);
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::build(
            Arc::new(pool),
            cfg,
            event_sender,
            ledger.clone(),
            notifier.clone(),
        );

        Self {
            state,
            ledger,
            notifier,
            _event_task: event_task,
        }
    }

    pub async fn user(
        &self,
        username: &str,
        role: Role,
        department: Option<Department>,
    ) -> user::Model {
        self.state
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@central-stores.test", username),
                full_name: username.replace('_', " "),
                role,
                department,
                blockchain_address: None,
            })
            .await
            .expect("create user")
    }

    /// The three approvers, a dean with a ledger address, and an admin.
    pub async fn staff(&self) -> Staff {
        let dean = self
            .state
            .users
            .create_user(NewUser {
                username: "cs_dean".to_string(),
                email: "cs_dean@central-stores.test".to_string(),
                full_name: "CS Dean".to_string(),
                role: Role::DepartmentDean,
                department: Some(Department::ComputerScience),
                blockchain_address: Some(DEAN_ADDRESS.to_string()),
            })
            .await
            .expect("create dean");

        Staff {
            dean,
            stores_manager: self
                .user("stores_manager", Role::StoresManager, Some(Department::ItAdmin))
                .await,
            procurement: self
                .user("procurement", Role::ProcurementOfficer, Some(Department::Procurement))
                .await,
            cfo: self.user("cfo", Role::Cfo, Some(Department::Finance)).await,
            admin: self.user("admin", Role::Admin, Some(Department::ItAdmin)).await,
        }
    }

    pub fn router(&self) -> Router {
        central_stores::app_router(self.state.clone())
    }

    /// Sends one request through the full router as `user_id`.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user_id {
            builder = builder.header("x-user-id", id.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

pub struct Staff {
    pub dean: user::Model,
    pub stores_manager: user::Model,
    pub procurement: user::Model,
    pub cfo: user::Model,
    pub admin: user::Model,
}
