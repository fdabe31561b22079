//! Approval workflow engine.
//!
//! Every request moves through the fixed pipeline STORES_MANAGER →
//! PROCUREMENT_OFFICER → CFO. Each stage is decided exactly once by a holder
//! of the stage's role; one rejection closes the request, three approvals
//! approve it.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::WorkflowConfig;
use crate::db::flatten_txn_error;
use crate::entities::approval_stage::{self, StageKind};
use crate::entities::department_request::{self, Priority, RequestStatus};
use crate::entities::user::{self, Department, Role};
use crate::entities::approval_history;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::{ContractCall, LedgerEmitter};
use crate::notifications::{
    NewNotification, NotificationDispatcher, NotificationKind, NotificationPriority, RelatedObject,
};
use crate::services::{not_blank, sequence};

impl StageKind {
    /// Stages created for every request, in decision order.
    pub const PIPELINE: [StageKind; 3] = [
        StageKind::StoresManager,
        StageKind::ProcurementOfficer,
        StageKind::Cfo,
    ];

    /// The only role allowed to decide a stage of this kind.
    pub fn required_role(self) -> Option<Role> {
        match self {
            StageKind::StoresManager => Some(Role::StoresManager),
            StageKind::ProcurementOfficer => Some(Role::ProcurementOfficer),
            StageKind::Cfo => Some(Role::Cfo),
            StageKind::Completed => None,
        }
    }

    /// The stage kind a role decides, if any.
    pub fn for_role(role: Role) -> Option<StageKind> {
        Self::PIPELINE
            .into_iter()
            .find(|kind| kind.required_role() == Some(role))
    }
}

/// How `get_pending_for` decides that an open stage is actionable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingFilter {
    /// The stage is the earliest open stage of a request that is still open.
    #[default]
    CurrentStage,
    /// The parent request's status is PROCESSING. Never lists a request's
    /// first stage, which is open while the request is still PENDING.
    ProcessingStatus,
}

/// The ordered stages of one request.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    stages: &'a [approval_stage::Model],
}

impl<'a> Pipeline<'a> {
    /// `stages` must be sorted by ordinal.
    pub fn new(stages: &'a [approval_stage::Model]) -> Self {
        Self { stages }
    }

    /// Earliest stage that has not been decided.
    pub fn current(&self) -> Option<&'a approval_stage::Model> {
        self.stages.iter().find(|s| !s.completed)
    }

    /// True iff there is at least one required stage and every required
    /// stage is completed and approved.
    pub fn is_fully_approved(&self) -> bool {
        let mut required = self.stages.iter().filter(|s| s.required).peekable();
        required.peek().is_some() && required.all(|s| s.completed && s.approved)
    }

    /// Status after a decision has been applied to these stages.
    pub fn status_after_decision(&self, approved: bool) -> RequestStatus {
        if !approved {
            RequestStatus::Rejected
        } else if self.is_fully_approved() {
            RequestStatus::Approved
        } else {
            RequestStatus::Processing
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRequest {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub item_name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub priority: Priority,
    #[validate(custom = "not_blank")]
    pub reason: String,
    /// Ignored for department deans, who always file for their own department
    pub department: Option<Department>,
}

/// Fields of a pending request that may still change. Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RequestUpdate {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub item_name: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    pub priority: Option<Priority>,
    #[validate(custom = "not_blank")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DecisionInput {
    pub approved: bool,
    #[validate(custom = "not_blank")]
    pub reason: String,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestView {
    pub id: Uuid,
    pub display_id: String,
    pub requester_id: Uuid,
    pub item_name: String,
    pub quantity: i32,
    pub priority: String,
    pub reason: String,
    pub status: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<department_request::Model> for RequestView {
    fn from(model: department_request::Model) -> Self {
        Self {
            id: model.id,
            display_id: model.display_id(),
            requester_id: model.requester_id,
            item_name: model.item_name,
            quantity: model.quantity,
            priority: model.priority,
            reason: model.reason,
            status: model.status,
            department: model.department,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageView {
    pub id: Uuid,
    pub ordinal: i32,
    pub stage: String,
    pub required_role: Option<Role>,
    pub required: bool,
    pub completed: bool,
    pub approved: bool,
    pub approver_id: Option<Uuid>,
    pub comments: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<approval_stage::Model> for StageView {
    fn from(model: approval_stage::Model) -> Self {
        Self {
            id: model.id,
            ordinal: model.ordinal,
            required_role: model.kind().and_then(StageKind::required_role),
            stage: model.stage,
            required: model.required,
            completed: model.completed,
            approved: model.approved,
            approver_id: model.approver_id,
            comments: model.comments,
            due_date: model.due_date,
            completed_at: model.completed_at,
        }
    }
}

/// A request with its approval pipeline and audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDetails {
    pub request: RequestView,
    pub approvals: Vec<StageView>,
    pub history: Vec<approval_history::Model>,
    pub current_stage: Option<String>,
    pub is_fully_approved: bool,
}

impl RequestDetails {
    fn new(
        request: department_request::Model,
        stages: Vec<approval_stage::Model>,
        history: Vec<approval_history::Model>,
    ) -> Self {
        let pipeline = Pipeline::new(&stages);
        let current_stage = pipeline.current().map(|s| s.stage.clone());
        let is_fully_approved = pipeline.is_fully_approved();
        Self {
            request: request.into(),
            approvals: stages.into_iter().map(StageView::from).collect(),
            history,
            current_stage,
            is_fully_approved,
        }
    }

    pub fn status(&self) -> Option<RequestStatus> {
        self.request.status.parse().ok()
    }
}

/// An open stage waiting on the caller's role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub request_id: Uuid,
    pub display_id: String,
    pub item_name: String,
    pub quantity: i32,
    pub department: String,
    pub priority: String,
    pub status: String,
    pub stage_id: Uuid,
    pub stage: String,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

struct DecisionOutcome {
    details: RequestDetails,
    request: department_request::Model,
    previous_status: RequestStatus,
    next_stage: Option<approval_stage::Model>,
}

/// The outcome written onto a stage when it is decided.
#[derive(Debug, Clone)]
pub(crate) struct StageDecision {
    pub approver_id: Uuid,
    pub approved: bool,
    pub comments: Option<String>,
    pub at: DateTime<Utc>,
}

/// Marks `stage` decided, but only if no other decision got there first.
pub(crate) async fn complete_stage<C: ConnectionTrait>(
    conn: &C,
    stage: &approval_stage::Model,
    request_label: &str,
    decision: StageDecision,
) -> Result<(), ServiceError> {
    let updated = approval_stage::Entity::update_many()
        .set(approval_stage::ActiveModel {
            completed: Set(true),
            approved: Set(decision.approved),
            approver_id: Set(Some(decision.approver_id)),
            comments: Set(decision.comments),
            completed_at: Set(Some(decision.at)),
            ..Default::default()
        })
        .filter(approval_stage::Column::Id.eq(stage.id))
        .filter(approval_stage::Column::Completed.eq(false))
        .exec(conn)
        .await?;
    if updated.rows_affected == 0 {
        return Err(ServiceError::StageAlreadyCompleted(format!(
            "{} stage of {} is already completed",
            stage.stage, request_label
        )));
    }
    Ok(())
}

/// Creates the three pipeline stages for a freshly inserted request.
pub async fn initialize_stages<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    due_days: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Vec<approval_stage::Model>, ServiceError> {
    let due_date = due_days.map(|days| now + Duration::days(i64::from(days)));
    let mut stages = Vec::with_capacity(StageKind::PIPELINE.len());
    for (position, kind) in StageKind::PIPELINE.into_iter().enumerate() {
        let stage = approval_stage::ActiveModel {
            request_id: Set(request_id),
            ordinal: Set(position as i32 + 1),
            stage: Set(kind.to_string()),
            required: Set(true),
            completed: Set(false),
            approved: Set(false),
            approver_id: Set(None),
            comments: Set(None),
            due_date: Set(due_date),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        stages.push(stage);
    }
    Ok(stages)
}

async fn load_stages<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<approval_stage::Model>, ServiceError> {
    Ok(approval_stage::Entity::find()
        .filter(approval_stage::Column::RequestId.eq(request_id))
        .order_by_asc(approval_stage::Column::Ordinal)
        .all(conn)
        .await?)
}

async fn load_history<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<approval_history::Model>, ServiceError> {
    Ok(approval_history::Entity::find()
        .filter(approval_history::Column::RequestId.eq(request_id))
        .order_by_asc(approval_history::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn find_request<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<department_request::Model, ServiceError> {
    department_request::Entity::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Request {} not found", request_id)))
}

fn parse_status(request: &department_request::Model) -> Result<RequestStatus, ServiceError> {
    request.status().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "request {} has unknown status {}",
            request.id, request.status
        ))
    })
}

/// Department deans only see their own department's requests.
fn ensure_can_view(
    actor: &user::Model,
    request: &department_request::Model,
) -> Result<(), ServiceError> {
    if actor.has_role(Role::DepartmentDean)
        && actor.department.as_deref() != Some(request.department.as_str())
    {
        return Err(ServiceError::Forbidden("Access denied".to_string()));
    }
    Ok(())
}

/// Drives requests through the approval pipeline.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    ledger: LedgerEmitter,
    notifications: NotificationDispatcher,
    config: WorkflowConfig,
}

impl ApprovalWorkflow {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        ledger: LedgerEmitter,
        notifications: NotificationDispatcher,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            ledger,
            notifications,
            config,
        }
    }

    /// Creates the approval stages of an existing request that has none yet.
    #[instrument(skip(self))]
    pub async fn initialize(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<approval_stage::Model>, ServiceError> {
        let due_days = self.config.stage_due_days;
        self.db
            .transaction::<_, Vec<approval_stage::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    find_request(txn, request_id).await?;
                    if !load_stages(txn, request_id).await?.is_empty() {
                        return Err(ServiceError::Conflict(format!(
                            "Request {} already has approval stages",
                            request_id
                        )));
                    }
                    initialize_stages(txn, request_id, due_days, Utc::now()).await
                })
            })
            .await
            .map_err(flatten_txn_error)
    }

    /// Files a new request and creates its pipeline in the same transaction.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id))]
    pub async fn create_request(
        &self,
        actor: &user::Model,
        input: NewRequest,
    ) -> Result<RequestDetails, ServiceError> {
        input.validate()?;

        let department = if actor.has_role(Role::DepartmentDean) {
            actor.department().ok_or_else(|| {
                ServiceError::ValidationError("department dean has no department".to_string())
            })?
        } else {
            input
                .department
                .or_else(|| actor.department())
                .ok_or_else(|| ServiceError::ValidationError("department is required".to_string()))?
        };

        let requester_id = actor.id;
        let due_days = self.config.stage_due_days;
        let call = ContractCall::create_request(
            input.item_name.trim(),
            input.quantity,
            input.priority.as_ref(),
            &input.reason,
        );

        let details = self
            .db
            .transaction::<_, RequestDetails, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request_no = sequence::next_value(txn, sequence::REQUEST).await?;
                    let request = department_request::ActiveModel {
                        request_no: Set(request_no),
                        requester_id: Set(requester_id),
                        item_name: Set(input.item_name.trim().to_string()),
                        quantity: Set(input.quantity),
                        priority: Set(input.priority.to_string()),
                        reason: Set(input.reason),
                        status: Set(RequestStatus::Pending.to_string()),
                        department: Set(department.to_string()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    let stages = initialize_stages(txn, request.id, due_days, Utc::now()).await?;
                    Ok(RequestDetails::new(request, stages, Vec::new()))
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(request = %details.request.display_id, department = %details.request.department, "request created");

        self.event_sender.publish(Event::RequestCreated {
            request_id: details.request.id,
            display_id: details.request.display_id.clone(),
        });
        self.ledger
            .emit(call, actor.blockchain_address.as_deref());

        if let Some(first) = details.approvals.first() {
            self.notify_pending(&details.request, &first.stage).await;
        }

        Ok(details)
    }

    /// Earliest undecided stage of a request.
    pub async fn current_stage(
        &self,
        request_id: Uuid,
    ) -> Result<Option<approval_stage::Model>, ServiceError> {
        find_request(self.db.as_ref(), request_id).await?;
        let stages = load_stages(self.db.as_ref(), request_id).await?;
        Ok(Pipeline::new(&stages).current().cloned())
    }

    pub async fn is_fully_approved(&self, request_id: Uuid) -> Result<bool, ServiceError> {
        find_request(self.db.as_ref(), request_id).await?;
        let stages = load_stages(self.db.as_ref(), request_id).await?;
        Ok(Pipeline::new(&stages).is_fully_approved())
    }

    /// Records one stage decision.
    ///
    /// Checks, in order: the stage is still open, the actor holds the stage's
    /// role, the request is not APPROVED/REJECTED, and the stage is the
    /// request's current stage. The stage update is conditional on
    /// `completed = false`, so of two racing decisions only one commits.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id, approved = input.approved))]
    pub async fn decide(
        &self,
        request_id: Uuid,
        stage_id: Uuid,
        actor: &user::Model,
        input: DecisionInput,
    ) -> Result<RequestDetails, ServiceError> {
        input.validate()?;

        let actor_id = actor.id;
        let actor_role = actor.role();
        let approved = input.approved;
        let reason = input.reason.clone();
        let comments = input.comments.clone();

        let outcome = self
            .db
            .transaction::<_, DecisionOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = find_request(txn, request_id).await?;
                    let mut stages = load_stages(txn, request_id).await?;
                    let position = stages
                        .iter()
                        .position(|s| s.id == stage_id)
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Approval stage {} not found", stage_id))
                        })?;
                    let stage = stages[position].clone();

                    if stage.completed {
                        return Err(ServiceError::StageAlreadyCompleted(format!(
                            "{} stage of {} is already completed",
                            stage.stage,
                            request.display_id()
                        )));
                    }

                    let required_role = stage.kind().and_then(StageKind::required_role);
                    if required_role.is_none() || required_role != actor_role {
                        return Err(ServiceError::Unauthorized(format!(
                            "You are not authorized to decide the {} stage",
                            stage.stage
                        )));
                    }

                    let previous_status = parse_status(&request)?;
                    if previous_status.is_terminal() {
                        return Err(ServiceError::RequestClosed(format!(
                            "{} is already {}",
                            request.display_id(),
                            previous_status
                        )));
                    }

                    if Pipeline::new(&stages).current().map(|s| s.id) != Some(stage.id) {
                        return Err(ServiceError::Conflict(format!(
                            "{} stage of {} is not the current stage",
                            stage.stage,
                            request.display_id()
                        )));
                    }

                    let now = Utc::now();
                    let decision = StageDecision {
                        approver_id: actor_id,
                        approved,
                        comments: comments.clone(),
                        at: now,
                    };
                    complete_stage(txn, &stage, &request.display_id(), decision).await?;

                    approval_history::ActiveModel {
                        request_id: Set(request_id),
                        stage_id: Set(stage_id),
                        approver_id: Set(actor_id),
                        approved: Set(approved),
                        reason: Set(reason),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    stages[position] = approval_stage::Model {
                        completed: true,
                        approved,
                        approver_id: Some(actor_id),
                        comments,
                        completed_at: Some(now),
                        ..stage
                    };
                    let pipeline = Pipeline::new(&stages);
                    let new_status = pipeline.status_after_decision(approved);
                    let next_stage = match new_status {
                        RequestStatus::Processing => pipeline.current().cloned(),
                        _ => None,
                    };

                    let mut active: department_request::ActiveModel = request.into();
                    active.status = Set(new_status.to_string());
                    let request = active.update(txn).await?;

                    let history = load_history(txn, request_id).await?;
                    Ok(DecisionOutcome {
                        details: RequestDetails::new(request.clone(), stages, history),
                        request,
                        previous_status,
                        next_stage,
                    })
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        let DecisionOutcome {
            details,
            request,
            previous_status,
            next_stage,
        } = outcome;
        let stage_name = details
            .approvals
            .iter()
            .find(|s| s.id == stage_id)
            .map(|s| s.stage.clone())
            .unwrap_or_default();

        info!(
            request = %details.request.display_id,
            stage = %stage_name,
            status = %details.request.status,
            "approval decision recorded"
        );

        self.event_sender.publish(Event::StageDecided {
            request_id,
            stage_id,
            stage: stage_name,
            approved,
            approver_id: actor_id,
        });
        if previous_status.to_string() != details.request.status {
            self.event_sender.publish(Event::RequestStatusChanged {
                request_id,
                old_status: previous_status.to_string(),
                new_status: details.request.status.clone(),
            });
        }

        self.ledger.emit(
            ContractCall::approve_request(request.request_no, approved, &input.reason),
            actor.blockchain_address.as_deref(),
        );

        self.notify_decision(&details.request, approved, &actor.username)
            .await;
        if let Some(next) = next_stage {
            self.notify_pending(&details.request, &next.stage).await;
        }

        Ok(details)
    }

    /// Open stages the user's role can act on now.
    #[instrument(skip(self, user), fields(user = %user.id))]
    pub async fn get_pending_for(
        &self,
        user: &user::Model,
        filter: PendingFilter,
    ) -> Result<Vec<PendingApproval>, ServiceError> {
        let Some(kind) = user.role().and_then(StageKind::for_role) else {
            return Ok(Vec::new());
        };

        let candidates = approval_stage::Entity::find()
            .filter(approval_stage::Column::Stage.eq(kind.to_string()))
            .filter(approval_stage::Column::Completed.eq(false))
            .filter(approval_stage::Column::Required.eq(true))
            .find_also_related(department_request::Entity)
            .all(self.db.as_ref())
            .await?;

        let candidates: Vec<(approval_stage::Model, department_request::Model)> = candidates
            .into_iter()
            .filter_map(|(stage, request)| request.map(|r| (stage, r)))
            .filter(|(_, request)| match filter {
                PendingFilter::ProcessingStatus => {
                    request.status() == Some(RequestStatus::Processing)
                }
                PendingFilter::CurrentStage => request
                    .status()
                    .map(|status| !status.is_terminal())
                    .unwrap_or(false),
            })
            .collect();

        let current: HashMap<Uuid, Uuid> = match filter {
            PendingFilter::ProcessingStatus => HashMap::new(),
            PendingFilter::CurrentStage => {
                let request_ids: Vec<Uuid> = candidates.iter().map(|(_, r)| r.id).collect();
                let all_stages = approval_stage::Entity::find()
                    .filter(approval_stage::Column::RequestId.is_in(request_ids))
                    .order_by_asc(approval_stage::Column::Ordinal)
                    .all(self.db.as_ref())
                    .await?;
                let mut by_request: HashMap<Uuid, Vec<approval_stage::Model>> = HashMap::new();
                for stage in all_stages {
                    by_request.entry(stage.request_id).or_default().push(stage);
                }
                by_request
                    .iter()
                    .filter_map(|(request_id, stages)| {
                        Pipeline::new(stages).current().map(|s| (*request_id, s.id))
                    })
                    .collect()
            }
        };

        let mut pending: Vec<PendingApproval> = candidates
            .into_iter()
            .filter(|(stage, request)| match filter {
                PendingFilter::ProcessingStatus => true,
                PendingFilter::CurrentStage => current.get(&request.id) == Some(&stage.id),
            })
            .map(|(stage, request)| PendingApproval {
                request_id: request.id,
                display_id: request.display_id(),
                item_name: request.item_name,
                quantity: request.quantity,
                department: request.department,
                priority: request.priority,
                status: request.status,
                stage_id: stage.id,
                stage: stage.stage,
                due_date: stage.due_date,
                created_at: request.created_at,
            })
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }

    /// `get_pending_for` with the configured filter.
    pub async fn pending_for(
        &self,
        user: &user::Model,
    ) -> Result<Vec<PendingApproval>, ServiceError> {
        self.get_pending_for(user, self.config.pending_filter).await
    }

    pub async fn request_details(
        &self,
        actor: &user::Model,
        request_id: Uuid,
    ) -> Result<RequestDetails, ServiceError> {
        let request = find_request(self.db.as_ref(), request_id).await?;
        ensure_can_view(actor, &request)?;
        let stages = load_stages(self.db.as_ref(), request_id).await?;
        let history = load_history(self.db.as_ref(), request_id).await?;
        Ok(RequestDetails::new(request, stages, history))
    }

    pub async fn list_requests(
        &self,
        actor: &user::Model,
        filter: RequestFilter,
    ) -> Result<Vec<RequestView>, ServiceError> {
        let mut query = department_request::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(department_request::Column::Status.eq(status.to_string()));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(department_request::Column::Priority.eq(priority.to_string()));
        }
        if actor.has_role(Role::DepartmentDean) {
            let department = actor.department.clone().unwrap_or_default();
            query = query.filter(department_request::Column::Department.eq(department));
        }

        let requests = query
            .order_by_desc(department_request::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(requests.into_iter().map(RequestView::from).collect())
    }

    pub async fn approval_history(
        &self,
        actor: &user::Model,
        request_id: Uuid,
    ) -> Result<Vec<approval_history::Model>, ServiceError> {
        let request = find_request(self.db.as_ref(), request_id).await?;
        ensure_can_view(actor, &request)?;
        load_history(self.db.as_ref(), request_id).await
    }

    /// Edits a request before any stage has been decided.
    ///
    /// Deans may only edit their own requests. The status is left alone; it
    /// only moves through decisions.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id))]
    pub async fn update_request(
        &self,
        actor: &user::Model,
        request_id: Uuid,
        input: RequestUpdate,
    ) -> Result<RequestDetails, ServiceError> {
        input.validate()?;

        let actor_id = actor.id;
        let is_dean = actor.has_role(Role::DepartmentDean);

        let details = self
            .db
            .transaction::<_, RequestDetails, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = find_request(txn, request_id).await?;
                    if is_dean && request.requester_id != actor_id {
                        return Err(ServiceError::Forbidden(
                            "Can only update your own requests".to_string(),
                        ));
                    }
                    let status = parse_status(&request)?;
                    if status != RequestStatus::Pending {
                        return Err(ServiceError::Conflict(format!(
                            "{} is {}; only pending requests can be edited",
                            request.display_id(),
                            status
                        )));
                    }

                    let mut active: department_request::ActiveModel = request.into();
                    if let Some(item_name) = input.item_name {
                        active.item_name = Set(item_name.trim().to_string());
                    }
                    if let Some(quantity) = input.quantity {
                        active.quantity = Set(quantity);
                    }
                    if let Some(priority) = input.priority {
                        active.priority = Set(priority.to_string());
                    }
                    if let Some(reason) = input.reason {
                        active.reason = Set(reason);
                    }
                    let request = active.update(txn).await?;

                    let stages = load_stages(txn, request_id).await?;
                    let history = load_history(txn, request_id).await?;
                    Ok(RequestDetails::new(request, stages, history))
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(request = %details.request.display_id, "request updated");
        self.event_sender.publish(Event::RequestUpdated {
            request_id,
            display_id: details.request.display_id.clone(),
        });
        Ok(details)
    }

    /// Deletes a request with its stages and history. Owner or admin only.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_request(
        &self,
        actor: &user::Model,
        request_id: Uuid,
    ) -> Result<(), ServiceError> {
        let actor_id = actor.id;
        let is_admin = actor.has_role(Role::Admin);

        let display_id = self
            .db
            .transaction::<_, String, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = find_request(txn, request_id).await?;
                    if request.requester_id != actor_id && !is_admin {
                        return Err(ServiceError::Forbidden(
                            "Only the requester or an admin can delete a request".to_string(),
                        ));
                    }

                    approval_history::Entity::delete_many()
                        .filter(approval_history::Column::RequestId.eq(request_id))
                        .exec(txn)
                        .await?;
                    approval_stage::Entity::delete_many()
                        .filter(approval_stage::Column::RequestId.eq(request_id))
                        .exec(txn)
                        .await?;
                    department_request::Entity::delete_by_id(request_id)
                        .exec(txn)
                        .await?;
                    Ok(request.display_id())
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(request = %display_id, "request deleted");
        self.event_sender.publish(Event::RequestDeleted(request_id));
        Ok(())
    }

    /// Reminds approvers of open stages whose due date has passed.
    ///
    /// Returns the number of overdue stages found.
    #[instrument(skip(self))]
    pub async fn send_approval_reminders(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let overdue = approval_stage::Entity::find()
            .filter(approval_stage::Column::Completed.eq(false))
            .filter(approval_stage::Column::Required.eq(true))
            .filter(approval_stage::Column::DueDate.lte(now))
            .find_also_related(department_request::Entity)
            .all(self.db.as_ref())
            .await?;

        let mut reminded = 0;
        for (stage, request) in overdue {
            let Some(request) = request else { continue };
            if request.status().map(|s| s.is_terminal()).unwrap_or(true) {
                continue;
            }
            let Some(role) = stage.kind().and_then(StageKind::required_role) else {
                continue;
            };
            let display_id = request.display_id();
            self.notifications
                .send_to_roles(
                    &[role],
                    NotificationKind::Reminder,
                    &format!("Reminder: Approval Required - Request {}", display_id),
                    &format!(
                        "Request for {} is awaiting your approval. Please review it soon.",
                        request.item_name
                    ),
                    NotificationPriority::Medium,
                    Some(RelatedObject::new("request", display_id)),
                )
                .await;
            reminded += 1;
        }

        if reminded > 0 {
            info!(stages = reminded, "approval reminders sent");
        }
        Ok(reminded)
    }

    async fn notify_decision(&self, request: &RequestView, approved: bool, approver: &str) {
        let (kind, verb) = if approved {
            (NotificationKind::ApprovalApproved, "approved")
        } else {
            (NotificationKind::ApprovalRejected, "rejected")
        };
        self.notifications
            .send(NewNotification {
                user_id: request.requester_id,
                kind,
                title: format!("Request {} {}", request.display_id, verb),
                message: format!(
                    "Your request for {} has been {} by {}",
                    request.item_name, verb, approver
                ),
                priority: NotificationPriority::High,
                related: Some(RelatedObject::new("request", request.display_id.clone())),
            })
            .await;
    }

    async fn notify_pending(&self, request: &RequestView, stage: &str) {
        let Some(role) = stage.parse::<StageKind>().ok().and_then(StageKind::required_role) else {
            warn!(stage, "no role mapped for stage");
            return;
        };
        self.notifications
            .send_to_roles(
                &[role],
                NotificationKind::ApprovalPending,
                &format!("Approval Required - Request {}", request.display_id),
                &format!("Request for {} requires your approval", request.item_name),
                NotificationPriority::High,
                Some(RelatedObject::new("request", request.display_id.clone())),
            )
            .await;
    }
}
