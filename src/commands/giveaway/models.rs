use chrono::Utc;
use uuid::Uuid;

// Returns the current moment as UTC epoch seconds. All persisted
// timestamps in the store use this representation.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GiveawayStatus {
    // Accepting entries, waiting for the end timestamp.
    Active,
    // Resolved with a frozen winner list. Rerolls replace the list
    // but never leave this state.
    Ended,
    // The destination channel or message became unreachable while
    // resolving. Terminal, never retried.
    Error,
    // Stopped by the host before the end timestamp.
    Cancelled,
}

impl GiveawayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiveawayStatus::Active => "active",
            GiveawayStatus::Ended => "ended",
            GiveawayStatus::Error => "error",
            GiveawayStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Giveaway {
    // The announcement message id, assigned by Discord. Doubles as
    // the unique giveaway identifier everywhere in the store.
    pub message_id: String,
    pub channel_id: u64,
    pub host_id: u64,
    pub prize: String,
    pub winner_count: u32,
    pub status: GiveawayStatus,
    pub created_at: i64,
    pub ends_at: i64,
    // Empty until the giveaway is resolved.
    pub winner_ids: Vec<String>,
    // Guaranteed winners, mutable while the giveaway is active.
    pub forced_winner_ids: Vec<String>,
    pub error_detail: Option<String>,
    pub resolved_at: Option<i64>,
    pub rerolled_at: Option<i64>,
    pub rerolled_by: Option<u64>,
}

impl Giveaway {
    pub fn new(
        message_id: &str,
        channel_id: u64,
        host_id: u64,
        prize: &str,
        winner_count: u32,
        ends_at: i64,
    ) -> Self {
        Giveaway {
            message_id: message_id.to_string(),
            channel_id,
            host_id,
            prize: prize.to_string(),
            winner_count,
            status: GiveawayStatus::Active,
            created_at: now_epoch(),
            ends_at,
            winner_ids: Vec::new(),
            forced_winner_ids: Vec::new(),
            error_detail: None,
            resolved_at: None,
            rerolled_at: None,
            rerolled_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GiveawayStatus::Active
    }
}

// Structural real/fake distinction. Both variants keep the Discord
// user id the entry traces back to, so display de-duplication never
// has to parse anything out of the entrant id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntrantKind {
    Real { user_id: u64 },
    Fake { source_id: u64 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entrant {
    // Unique within a single giveaway. Real entrants use their
    // Discord user id, synthetic ones get a minted identity.
    pub entrant_id: String,
    pub joined_at: i64,
    pub forced: bool,
    pub kind: EntrantKind,
}

impl Entrant {
    // An entrant created by a real opt-in reaction.
    pub fn real(user_id: u64) -> Self {
        Entrant {
            entrant_id: user_id.to_string(),
            joined_at: now_epoch(),
            forced: false,
            kind: EntrantKind::Real { user_id },
        }
    }

    // An entrant upserted by the force-winners command.
    pub fn forced(user_id: u64) -> Self {
        Entrant {
            forced: true,
            ..Entrant::real(user_id)
        }
    }

    // A synthetic entrant attributed to a real member of the pool.
    // The minted id can never collide with a numeric Discord id.
    pub fn fake(source_id: u64) -> Self {
        Entrant {
            entrant_id: format!("fake-{}", Uuid::new_v4()),
            joined_at: now_epoch(),
            forced: false,
            kind: EntrantKind::Fake { source_id },
        }
    }

    pub fn is_fake(&self) -> bool {
        matches!(self.kind, EntrantKind::Fake { .. })
    }

    // The real identity this entry traces back to.
    pub fn origin_id(&self) -> u64 {
        match self.kind {
            EntrantKind::Real { user_id } => user_id,
            EntrantKind::Fake { source_id } => source_id,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FillPlanStatus {
    Active,
    Completed,
    Cancelled,
    Error,
}

impl FillPlanStatus {
    // Once a plan leaves the active state it never changes again.
    pub fn is_terminal(&self) -> bool {
        *self != FillPlanStatus::Active
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillPlanStatus::Active => "active",
            FillPlanStatus::Completed => "completed",
            FillPlanStatus::Cancelled => "cancelled",
            FillPlanStatus::Error => "error",
        }
    }
}

// Persisted progress of one gradual fill task. There is at most one
// plan per giveaway; starting a new fill replaces the plan in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FillPlan {
    pub giveaway_id: String,
    pub channel_id: u64,
    pub total: u32,
    // Entries left to place. Non-increasing while the plan is active
    // and always <= total.
    pub remaining: u32,
    pub deadline: i64,
    pub created_by: u64,
    pub created_at: i64,
    pub status: FillPlanStatus,
    pub error_detail: Option<String>,
    // Entrant ids this plan has actually placed so far.
    pub spawned_ids: Vec<String>,
    // Real member ids the synthetic entries are attributed to. Kept
    // on the plan so a restarted worker draws from the same pool.
    pub member_pool: Vec<u64>,
}

impl FillPlan {
    pub fn new(
        giveaway_id: &str,
        channel_id: u64,
        member_pool: Vec<u64>,
        total: u32,
        deadline: i64,
        created_by: u64,
    ) -> Self {
        FillPlan {
            giveaway_id: giveaway_id.to_string(),
            channel_id,
            member_pool,
            total,
            remaining: total,
            deadline,
            created_by,
            created_at: now_epoch(),
            status: FillPlanStatus::Active,
            error_detail: None,
            spawned_ids: Vec::new(),
        }
    }
}
