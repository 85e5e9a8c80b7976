use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hotelpos_core::{DomainError, DomainResult, ItemId, OrderId, OrderLineId, ensure_positive};

/// Kitchen lifecycle of one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineState {
    Pending,
    Cooking,
    Ready,
    Served,
    Cancelled,
}

impl LineState {
    pub const ALL: [LineState; 5] = [
        LineState::Pending,
        LineState::Cooking,
        LineState::Ready,
        LineState::Served,
        LineState::Cancelled,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            LineState::Pending => "PENDING",
            LineState::Cooking => "COOKING",
            LineState::Ready => "READY",
            LineState::Served => "SERVED",
            LineState::Cancelled => "CANCELLED",
        }
    }

    /// Resolve a state code from the catalog.
    ///
    /// Unknown codes are `NotFound`, never a silent default.
    pub fn from_code(code: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.code().eq_ignore_ascii_case(code.trim()))
            .ok_or_else(|| DomainError::not_found(format!("state code {code:?}")))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LineState::Served | LineState::Cancelled)
    }
}

impl core::fmt::Display for LineState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl core::str::FromStr for LineState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
    }
}

/// What moving a line to a target state involves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Already in the target state.
    Noop,
    Move {
        from: LineState,
        to: LineState,
        /// Entering COOKING takes ingredients out of stock.
        consumes: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub portions: Decimal,
    pub state: LineState,
    pub created_at: DateTime<Utc>,
    pub cook_started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub served_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl OrderLine {
    pub fn has_been_cooked(&self) -> bool {
        self.cook_started_at.is_some()
    }

    /// Check a move to `target` without changing anything.
    pub fn plan(&self, target: LineState) -> DomainResult<Transition> {
        if self.state == target {
            return Ok(Transition::Noop);
        }
        if self.state.is_terminal() {
            return Err(DomainError::invariant(format!(
                "line {} is {} and cannot move to {target}",
                self.id, self.state
            )));
        }
        if target == LineState::Pending {
            return Err(DomainError::invariant(format!(
                "line {} cannot go back to {target} from {}",
                self.id, self.state
            )));
        }

        Ok(Transition::Move {
            from: self.state,
            to: target,
            consumes: target == LineState::Cooking,
        })
    }

    /// Set the new state and its timestamp. Call after [`Self::plan`] succeeded.
    pub fn apply(&mut self, target: LineState, at: DateTime<Utc>) {
        match target {
            LineState::Pending => {}
            LineState::Cooking => {
                if self.cook_started_at.is_none() {
                    self.cook_started_at = Some(at);
                }
            }
            LineState::Ready => self.ready_at = Some(at),
            LineState::Served => self.served_at = Some(at),
            LineState::Cancelled => self.cancelled_at = Some(at),
        }
        self.state = target;
    }

    /// Timestamp the kitchen queue sorts this line by in its current state.
    pub fn queued_at(&self) -> DateTime<Utc> {
        let stamp = match self.state {
            LineState::Pending => None,
            LineState::Cooking => self.cook_started_at,
            LineState::Ready => self.ready_at,
            LineState::Served => self.served_at,
            LineState::Cancelled => self.cancelled_at,
        };
        stamp.unwrap_or(self.created_at)
    }
}

/// A table's order: a set of dish lines moving through the kitchen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            created_at,
            lines: Vec::new(),
        }
    }

    /// Append a PENDING line for `portions` of `item_id`.
    pub fn add_line(&mut self, item_id: ItemId, portions: Decimal) -> DomainResult<OrderLineId> {
        let portions = ensure_positive(portions, "portions")?;
        let line = OrderLine {
            id: OrderLineId::new(),
            order_id: self.id,
            item_id,
            portions,
            state: LineState::Pending,
            created_at: self.created_at,
            cook_started_at: None,
            ready_at: None,
            served_at: None,
            cancelled_at: None,
        };
        let id = line.id;
        self.lines.push(line);
        Ok(id)
    }

    pub fn line(&self, line_id: OrderLineId) -> DomainResult<&OrderLine> {
        self.lines
            .iter()
            .find(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found(format!("order line {line_id}")))
    }

    pub fn line_mut(&mut self, line_id: OrderLineId) -> DomainResult<&mut OrderLine> {
        self.lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found(format!("order line {line_id}")))
    }
}
