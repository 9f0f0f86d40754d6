use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, BatchId, DomainError, LocationId, ProductId, TransferId,
};

use crate::stock::StockKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    Waiting,
    Ready,
    Done,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Draft => "draft",
            TransferStatus::Waiting => "waiting",
            TransferStatus::Ready => "ready",
            TransferStatus::Done => "done",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    /// Still open for advance, execute or cancel.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TransferStatus::Draft | TransferStatus::Waiting | TransferStatus::Ready
        )
    }

    pub(crate) fn next(&self) -> Option<TransferStatus> {
        match self {
            TransferStatus::Draft => Some(TransferStatus::Waiting),
            TransferStatus::Waiting => Some(TransferStatus::Ready),
            _ => None,
        }
    }
}

impl core::str::FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TransferStatus::Draft),
            "waiting" => Ok(TransferStatus::Waiting),
            "ready" => Ok(TransferStatus::Ready),
            "done" => Ok(TransferStatus::Done),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown transfer status: {other}"
            ))),
        }
    }
}

/// Aggregate root: a document moving quantity of one product between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub product_id: ProductId,
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub quantity: i64,
    pub status: TransferStatus,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ledger batch written by `execute`.
    pub executed_batch: Option<BatchId>,
    pub version: u64,
}

impl Transfer {
    /// Create an empty, not-yet-created instance to run `Create` against.
    pub fn empty(id: TransferId) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            product_id: ProductId::from_uuid(Default::default()),
            source_location_id: LocationId::from_uuid(Default::default()),
            destination_location_id: LocationId::from_uuid(Default::default()),
            quantity: 0,
            status: TransferStatus::Draft,
            actor: String::new(),
            note: None,
            created_at: epoch,
            updated_at: epoch,
            executed_batch: None,
            version: 0,
        }
    }

    /// Every applied event bumps the version, so only `empty` sits at zero.
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    pub fn source_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.source_location_id)
    }

    pub fn destination_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.destination_location_id)
    }

    /// Re-check the movement itself; used again right before stock is touched.
    pub fn validate_movement(&self) -> Result<(), DomainError> {
        if self.source_location_id == self.destination_location_id {
            return Err(DomainError::validation(
                "source and destination locations must differ",
            ));
        }
        if self.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        Ok(())
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub quantity: i64,
    pub actor: String,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Create(CreateTransfer),
    Advance { occurred_at: DateTime<Utc> },
    Execute {
        batch_id: BatchId,
        occurred_at: DateTime<Utc>,
    },
    Cancel { occurred_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Created(CreateTransfer),
    Advanced {
        to: TransferStatus,
        occurred_at: DateTime<Utc>,
    },
    Executed {
        batch_id: BatchId,
        occurred_at: DateTime<Utc>,
    },
    Cancelled { occurred_at: DateTime<Utc> },
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::Created(e) => {
                self.id = e.transfer_id;
                self.product_id = e.product_id;
                self.source_location_id = e.source_location_id;
                self.destination_location_id = e.destination_location_id;
                self.quantity = e.quantity;
                self.status = TransferStatus::Draft;
                self.actor = e.actor.clone();
                self.note = e.note.clone();
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
            }
            TransferEvent::Advanced { to, occurred_at } => {
                self.status = *to;
                self.updated_at = *occurred_at;
            }
            TransferEvent::Executed {
                batch_id,
                occurred_at,
            } => {
                self.status = TransferStatus::Done;
                self.executed_batch = Some(*batch_id);
                self.updated_at = *occurred_at;
            }
            TransferEvent::Cancelled { occurred_at } => {
                self.status = TransferStatus::Cancelled;
                self.updated_at = *occurred_at;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Create(cmd) => self.handle_create(cmd),
            TransferCommand::Advance { occurred_at } => {
                self.ensure_exists()?;
                let to = self.status.next().ok_or_else(|| {
                    DomainError::invalid_transition(format!(
                        "cannot advance transfer in status {}",
                        self.status.as_str()
                    ))
                })?;
                Ok(vec![TransferEvent::Advanced {
                    to,
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Execute {
                batch_id,
                occurred_at,
            } => {
                self.ensure_exists()?;
                self.ensure_open("execute")?;
                self.validate_movement()?;
                Ok(vec![TransferEvent::Executed {
                    batch_id: *batch_id,
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Cancel { occurred_at } => {
                self.ensure_exists()?;
                self.ensure_open("cancel")?;
                Ok(vec![TransferEvent::Cancelled {
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl Transfer {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.exists() {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("transfer {}", self.id)))
        }
    }

    fn ensure_open(&self, action: &str) -> Result<(), DomainError> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(format!(
                "cannot {action} transfer in status {}",
                self.status.as_str()
            )))
        }
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if cmd.source_location_id == cmd.destination_location_id {
            return Err(DomainError::validation(
                "source and destination locations must differ",
            ));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        Ok(vec![TransferEvent::Created(cmd.clone())])
    }
}
