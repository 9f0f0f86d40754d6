use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AdjustmentId, Aggregate, AggregateRoot, BatchId, DomainError, LocationId, ProductId,
};

use crate::stock::StockKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Draft,
    Done,
}

impl AdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::Draft => "draft",
            AdjustmentStatus::Done => "done",
        }
    }
}

impl core::str::FromStr for AdjustmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AdjustmentStatus::Draft),
            "done" => Ok(AdjustmentStatus::Done),
            other => Err(DomainError::validation(format!(
                "unknown adjustment status: {other}"
            ))),
        }
    }
}

/// What to do when the live quantity no longer matches the creation snapshot.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Apply `counted - live`, so the level always ends at the counted quantity.
    #[default]
    Recompute,
    /// Abort with `StaleAdjustment`; the caller recounts.
    RejectOnDrift,
}

impl core::str::FromStr for StalePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recompute" => Ok(StalePolicy::Recompute),
            "reject_on_drift" => Ok(StalePolicy::RejectOnDrift),
            other => Err(DomainError::validation(format!(
                "unknown adjustment policy: {other}"
            ))),
        }
    }
}

/// Aggregate root: a physical count reconciling one stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    /// Stock level at creation time.
    pub system_quantity: i64,
    pub counted_quantity: i64,
    /// `counted - system` at creation time.
    pub variance: i64,
    pub reason: Option<String>,
    pub actor: String,
    pub status: AdjustmentStatus,
    /// Live level read under lock at execution.
    pub executed_system_quantity: Option<i64>,
    /// Delta actually written to the ledger.
    pub executed_variance: Option<i64>,
    /// `None` for a done adjustment whose count already matched.
    pub executed_batch: Option<BatchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Adjustment {
    pub fn empty(id: AdjustmentId) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            product_id: ProductId::from_uuid(Default::default()),
            location_id: LocationId::from_uuid(Default::default()),
            system_quantity: 0,
            counted_quantity: 0,
            variance: 0,
            reason: None,
            actor: String::new(),
            status: AdjustmentStatus::Draft,
            executed_system_quantity: None,
            executed_variance: None,
            executed_batch: None,
            created_at: epoch,
            updated_at: epoch,
            version: 0,
        }
    }

    pub fn exists(&self) -> bool {
        self.version > 0
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// The live level differed from the snapshot when this was executed.
    pub fn drifted(&self) -> bool {
        self.executed_system_quantity
            .is_some_and(|live| live != self.system_quantity)
    }

    /// Only an existing draft can be executed. Checked before any drift test.
    pub fn ensure_executable(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("adjustment {}", self.id)));
        }
        if self.status == AdjustmentStatus::Done {
            return Err(DomainError::invalid_transition(
                "adjustment has already been executed",
            ));
        }
        Ok(())
    }

    /// Delta to write for a given live level, honoring the drift policy.
    pub fn variance_against(&self, live: i64, policy: StalePolicy) -> Result<i64, DomainError> {
        if live != self.system_quantity && policy == StalePolicy::RejectOnDrift {
            return Err(DomainError::StaleAdjustment {
                snapshot: self.system_quantity,
                live,
            });
        }
        Ok(self.counted_quantity - live)
    }
}

impl AggregateRoot for Adjustment {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAdjustment {
    pub adjustment_id: AdjustmentId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub system_quantity: i64,
    pub counted_quantity: i64,
    pub reason: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteAdjustment {
    pub live_quantity: i64,
    pub policy: StalePolicy,
    /// Batch of the ledger entry, or `None` when nothing is written.
    pub batch_id: Option<BatchId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentCommand {
    Create(CreateAdjustment),
    Execute(ExecuteAdjustment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentCreated {
    pub command: CreateAdjustment,
    pub variance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentExecuted {
    pub system_quantity: i64,
    pub variance: i64,
    pub batch_id: Option<BatchId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentEvent {
    Created(AdjustmentCreated),
    Executed(AdjustmentExecuted),
}

impl Aggregate for Adjustment {
    type Command = AdjustmentCommand;
    type Event = AdjustmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AdjustmentEvent::Created(e) => {
                let c = &e.command;
                self.id = c.adjustment_id;
                self.product_id = c.product_id;
                self.location_id = c.location_id;
                self.system_quantity = c.system_quantity;
                self.counted_quantity = c.counted_quantity;
                self.variance = e.variance;
                self.reason = c.reason.clone();
                self.actor = c.actor.clone();
                self.status = AdjustmentStatus::Draft;
                self.created_at = c.occurred_at;
                self.updated_at = c.occurred_at;
            }
            AdjustmentEvent::Executed(e) => {
                self.status = AdjustmentStatus::Done;
                self.executed_system_quantity = Some(e.system_quantity);
                self.executed_variance = Some(e.variance);
                self.executed_batch = e.batch_id;
                self.updated_at = e.occurred_at;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AdjustmentCommand::Create(cmd) => self.handle_create(cmd),
            AdjustmentCommand::Execute(cmd) => self.handle_execute(cmd),
        }
    }
}

impl Adjustment {
    fn handle_create(&self, cmd: &CreateAdjustment) -> Result<Vec<AdjustmentEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::conflict("adjustment already exists"));
        }
        if cmd.counted_quantity < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        if cmd.system_quantity < 0 {
            return Err(DomainError::invariant("system quantity cannot be negative"));
        }
        Ok(vec![AdjustmentEvent::Created(AdjustmentCreated {
            command: cmd.clone(),
            variance: cmd.counted_quantity - cmd.system_quantity,
        })])
    }

    fn handle_execute(&self, cmd: &ExecuteAdjustment) -> Result<Vec<AdjustmentEvent>, DomainError> {
        self.ensure_executable()?;
        let variance = self.variance_against(cmd.live_quantity, cmd.policy)?;
        if (variance == 0) != cmd.batch_id.is_none() {
            return Err(DomainError::invariant(
                "a ledger batch is written exactly when the variance is non-zero",
            ));
        }
        Ok(vec![AdjustmentEvent::Executed(AdjustmentExecuted {
            system_quantity: cmd.live_quantity,
            variance,
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
