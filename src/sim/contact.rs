//! Contact resolution
//!
//! Turns the raw contact log of a physics step into scheduled work. This is
//! a pure function of (contacts, bodies, ledger, clock): it never creates or
//! removes bodies. The caller commits the returned records to the ledger and
//! hands merges/triggers to the processor, after the step has finished.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use super::body::{Body, BodyId, SpecialKind};
use super::world::{BoundaryTag, Contactant, PhysicsWorld, RawContact};
use crate::tuning::Tuning;

/// Read-only view of the body registry
pub trait BodyLookup {
    fn lookup(&self, id: BodyId) -> Option<&Body>;
}

impl BodyLookup for PhysicsWorld {
    fn lookup(&self, id: BodyId) -> Option<&Body> {
        self.body(id)
    }
}

impl BodyLookup for BTreeMap<BodyId, Body> {
    fn lookup(&self, id: BodyId) -> Option<&Body> {
        self.get(&id)
    }
}

/// Dedup key: the body pair in ascending id order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey(pub BodyId, pub BodyId);

impl PairKey {
    pub fn new(a: BodyId, b: BodyId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

/// Marks a contact episode as handled until `expires_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactRecord {
    pub key: PairKey,
    pub expires_at: u64,
}

/// Two equal-level bodies to be combined at the next drain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingMerge {
    pub id_a: BodyId,
    pub id_b: BodyId,
    /// Level of both inputs (the product is `level + 1`)
    pub level: u8,
    /// Positions at contact time
    pub position_a: Vec2,
    pub position_b: Vec2,
}

impl PendingMerge {
    /// Where the pair touched, for effects played before the drain
    pub fn contact_midpoint(&self) -> Vec2 {
        (self.position_a + self.position_b) * 0.5
    }
}

/// A special token touched something and should fire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecialTrigger {
    pub source: BodyId,
    pub special: SpecialKind,
    pub position: Vec2,
}

/// Time windows, in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactRules {
    pub grace_ticks: u64,
    pub dedup_ticks: u64,
    pub merge_delay_ticks: u64,
}

impl ContactRules {
    pub fn from_tuning(tuning: &Tuning) -> Self {
        Self {
            grace_ticks: tuning.grace_ticks(),
            dedup_ticks: tuning.dedup_ticks(),
            merge_delay_ticks: tuning.merge_delay_ticks(),
        }
    }
}

/// Why a contact did not become work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rejection {
    /// Boundary, or a body that is no longer registered
    NotABody,
    MarkedForDeletion,
    /// Held preview at the dispenser
    Held,
    /// Both bodies are fresh from the dispenser
    BothInGrace,
    /// Pair already handled in this dedup window
    Duplicate,
    LevelMismatch,
    /// Global inter-merge gap not yet elapsed
    MergeDelay,
    /// One of the bodies is already part of a merge this step
    AlreadyClaimed,
    /// Special token already fired this step
    AlreadyTriggered,
}

/// Output of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct ContactResolution {
    pub merges: Vec<PendingMerge>,
    pub triggers: Vec<SpecialTrigger>,
    /// Records to commit to the ledger
    pub records: Vec<ContactRecord>,
    /// Tick of the last accepted merge after this pass
    pub last_merge_tick: Option<u64>,
    pub rejections: BTreeMap<Rejection, u32>,
}

impl ContactResolution {
    pub fn rejected(&self) -> u32 {
        self.rejections.values().sum()
    }

    pub fn rejected_for(&self, reason: Rejection) -> u32 {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    fn reject(&mut self, reason: Rejection) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }
}

/// Short-lived memory of resolved contact pairs
#[derive(Debug, Clone, Default)]
pub struct ContactLedger {
    records: BTreeMap<PairKey, u64>,
    last_merge_tick: Option<u64>,
}

impl ContactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair is suppressed at `now`
    pub fn is_active(&self, key: PairKey, now: u64) -> bool {
        self.records.get(&key).is_some_and(|&expires| now < expires)
    }

    pub fn last_merge_tick(&self) -> Option<u64> {
        self.last_merge_tick
    }

    /// Apply a resolution's bookkeeping
    pub fn commit(&mut self, resolution: &ContactResolution) {
        for record in &resolution.records {
            self.records.insert(record.key, record.expires_at);
        }
        if resolution.last_merge_tick.is_some() {
            self.last_merge_tick = resolution.last_merge_tick;
        }
    }

    /// Forget expired records
    pub fn prune(&mut self, now: u64) {
        self.records.retain(|_, expires| now < *expires);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decide what each raw contact means, without touching the world
pub fn resolve_contacts<R: BodyLookup>(
    raw: &[RawContact],
    registry: &R,
    ledger: &ContactLedger,
    rules: &ContactRules,
    now: u64,
) -> ContactResolution {
    let mut out = ContactResolution {
        last_merge_tick: ledger.last_merge_tick(),
        ..Default::default()
    };
    let mut claimed: BTreeSet<BodyId> = BTreeSet::new();
    let mut fired: BTreeSet<BodyId> = BTreeSet::new();
    let mut pending_keys: BTreeSet<PairKey> = BTreeSet::new();

    for contact in raw {
        match (contact.a, contact.b) {
            (Contactant::Body(a), Contactant::Body(b)) => {
                let (Some(body_a), Some(body_b)) = (registry.lookup(a), registry.lookup(b)) else {
                    out.reject(Rejection::NotABody);
                    continue;
                };
                resolve_body_pair(body_a, body_b, ledger, rules, now, &mut out, &mut claimed, &mut fired, &mut pending_keys);
            }
            (Contactant::Body(id), Contactant::Boundary(_, tag))
            | (Contactant::Boundary(_, tag), Contactant::Body(id)) => {
                // Only a special token landing on the floor does anything
                let Some(body) = registry.lookup(id) else {
                    out.reject(Rejection::NotABody);
                    continue;
                };
                match (body.kind.special(), tag) {
                    (Some(special), Some(BoundaryTag::Floor)) => {
                        try_fire(body, special, &mut out, &mut fired);
                    }
                    _ => out.reject(Rejection::NotABody),
                }
            }
            (Contactant::Boundary(..), Contactant::Boundary(..)) => {
                out.reject(Rejection::NotABody);
            }
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn resolve_body_pair(
    a: &Body,
    b: &Body,
    ledger: &ContactLedger,
    rules: &ContactRules,
    now: u64,
    out: &mut ContactResolution,
    claimed: &mut BTreeSet<BodyId>,
    fired: &mut BTreeSet<BodyId>,
    pending_keys: &mut BTreeSet<PairKey>,
) {
    if a.marked_for_deletion || b.marked_for_deletion {
        out.reject(Rejection::MarkedForDeletion);
        return;
    }
    if a.held || b.held {
        out.reject(Rejection::Held);
        return;
    }

    // Special tokens fire on any live body; they never merge
    let special_a = a.kind.special();
    let special_b = b.kind.special();
    if special_a.is_some() || special_b.is_some() {
        if let Some(special) = special_a {
            try_fire(a, special, out, fired);
        }
        if let Some(special) = special_b {
            try_fire(b, special, out, fired);
        }
        return;
    }

    if a.in_grace(now, rules.grace_ticks) && b.in_grace(now, rules.grace_ticks) {
        out.reject(Rejection::BothInGrace);
        return;
    }

    let key = PairKey::new(a.id, b.id);
    if ledger.is_active(key, now) || pending_keys.contains(&key) {
        out.reject(Rejection::Duplicate);
        return;
    }

    if a.level != b.level {
        out.reject(Rejection::LevelMismatch);
        return;
    }

    if claimed.contains(&a.id) || claimed.contains(&b.id) {
        out.reject(Rejection::AlreadyClaimed);
        return;
    }

    if let Some(last) = out.last_merge_tick {
        if now.saturating_sub(last) < rules.merge_delay_ticks {
            out.reject(Rejection::MergeDelay);
            return;
        }
    }

    claimed.insert(a.id);
    claimed.insert(b.id);
    pending_keys.insert(key);
    out.records.push(ContactRecord {
        key,
        expires_at: now + rules.dedup_ticks.max(1),
    });
    out.last_merge_tick = Some(now);

    let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
    out.merges.push(PendingMerge {
        id_a: first.id,
        id_b: second.id,
        level: first.level,
        position_a: first.pos,
        position_b: second.pos,
    });
}

fn try_fire(body: &Body, special: SpecialKind, out: &mut ContactResolution, fired: &mut BTreeSet<BodyId>) {
    if !body.is_active() {
        out.reject(Rejection::MarkedForDeletion);
        return;
    }
    if !fired.insert(body.id) {
        out.reject(Rejection::AlreadyTriggered);
        return;
    }
    out.triggers.push(SpecialTrigger {
        source: body.id,
        special,
        position: body.pos,
    });
}
