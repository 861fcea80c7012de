//! Presence store: connection status, current user and room participants.
//!
//! The store is a `tokio::sync::watch` container. [`PresenceStore::new`] hands out exactly
//! one [`PresenceWriter`] (owned by the socket session) and a cloneable
//! [`PresenceStore`] reader for any number of UI consumers. Every writer operation is a
//! reducer applied atomically to the current snapshot.

use collab_shared::protocol::ParticipantInfo;
use tokio::sync::watch;

/// Fixed palette participants' colour tags are drawn from.
pub const COLOR_PALETTE: [&str; 8] = [
    "#E57373", "#64B5F6", "#81C784", "#FFB74D", "#BA68C8", "#4DB6AC", "#F06292", "#A1887F",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub color_tag: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            color_tag: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color_tag: impl Into<String>) -> Self {
        self.color_tag = Some(color_tag.into());
        self
    }
}

impl From<ParticipantInfo> for Participant {
    fn from(info: ParticipantInfo) -> Self {
        Participant::new(info.id, info.display_name)
    }
}

/// Point-in-time view of the presence store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub connected: bool,
    pub current_user: Option<Participant>,
    pub participants: Vec<Participant>,
}

impl PresenceSnapshot {
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Participants other than the current user.
    pub fn others(&self) -> impl Iterator<Item = &Participant> {
        let me = self.current_user.as_ref().map(|p| p.id.as_str());
        self.participants
            .iter()
            .filter(move |p| Some(p.id.as_str()) != me)
    }

    /// Participants that joined and left between `self` and `newer`.
    pub fn diff(&self, newer: &PresenceSnapshot) -> PresenceDiff {
        PresenceDiff {
            joined: newer
                .participants
                .iter()
                .filter(|p| self.participant(&p.id).is_none())
                .cloned()
                .collect(),
            left: self
                .participants
                .iter()
                .filter(|p| newer.participant(&p.id).is_none())
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDiff {
    pub joined: Vec<Participant>,
    pub left: Vec<Participant>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Pick a colour for a newcomer given the current participant set.
///
/// The first palette entry nobody uses wins; once the palette is exhausted the choice
/// wraps around by set size and collisions become possible.
pub fn assign_color(participants: &[Participant]) -> String {
    COLOR_PALETTE
        .iter()
        .find(|color| {
            !participants
                .iter()
                .any(|p| p.color_tag.as_deref() == Some(**color))
        })
        .unwrap_or(&COLOR_PALETTE[participants.len() % COLOR_PALETTE.len()])
        .to_string()
}

/// Read side of the presence store.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    rx: watch::Receiver<PresenceSnapshot>,
}

impl PresenceStore {
    /// Create an empty store, returning its single writer and a reader.
    pub fn new() -> (PresenceWriter, PresenceStore) {
        let (tx, rx) = watch::channel(PresenceSnapshot::default());
        (PresenceWriter { tx }, PresenceStore { rx })
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.rx.borrow().connected
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.rx.clone()
    }
}

/// Write side of the presence store. Not `Clone`: holding it is the right to mutate.
#[derive(Debug)]
pub struct PresenceWriter {
    tx: watch::Sender<PresenceSnapshot>,
}

impl PresenceWriter {
    /// Another reader for the same store.
    pub fn reader(&self) -> PresenceStore {
        PresenceStore {
            rx: self.tx.subscribe(),
        }
    }

    pub fn set_connection_status(&self, connected: bool) {
        self.tx.send_if_modified(|snapshot| {
            let changed = snapshot.connected != connected;
            snapshot.connected = connected;
            changed
        });
    }

    pub fn set_current_user(&self, user: Participant) {
        self.tx.send_modify(|snapshot| {
            let color_tag = user
                .color_tag
                .clone()
                .or_else(|| {
                    snapshot
                        .participant(&user.id)
                        .and_then(|p| p.color_tag.clone())
                })
                .unwrap_or_else(|| assign_color(&snapshot.participants));
            snapshot.current_user = Some(Participant {
                color_tag: Some(color_tag),
                ..user
            });
        });
    }

    /// Add a participant, or update the one with the same id in place.
    pub fn add_user(&self, mut participant: Participant) {
        self.tx.send_modify(|snapshot| {
            if participant.color_tag.is_none() && snapshot.participant(&participant.id).is_none() {
                let color = own_color(snapshot.current_user.as_ref(), &participant.id)
                    .filter(|color| !color_taken(&snapshot.participants, color))
                    .unwrap_or_else(|| next_color(snapshot));
                participant.color_tag = Some(color);
            }
            upsert(&mut snapshot.participants, participant);
            sync_current_user(snapshot);
        });
    }

    /// Returns `true` when a participant was removed.
    pub fn remove_user(&self, id: &str) -> bool {
        self.tx.send_if_modified(|snapshot| {
            let before = snapshot.participants.len();
            snapshot.participants.retain(|p| p.id != id);
            snapshot.participants.len() != before
        })
    }

    /// Replace the participant set with a server snapshot, keeping known colours.
    ///
    /// The current user's entry is coloured first so nobody else can take its colour.
    pub fn replace_participants(&self, participants: Vec<Participant>) {
        self.tx.send_modify(|snapshot| {
            let previous = std::mem::take(&mut snapshot.participants);
            let me = snapshot.current_user.clone();
            let order: Vec<String> = participants.iter().map(|p| p.id.clone()).collect();
            let (mine, rest): (Vec<_>, Vec<_>) = participants
                .into_iter()
                .partition(|p| me.as_ref().is_some_and(|me| me.id == p.id));
            for mut participant in mine.into_iter().chain(rest) {
                if participant.color_tag.is_none() {
                    participant.color_tag = previous
                        .iter()
                        .find(|p| p.id == participant.id)
                        .and_then(|p| p.color_tag.clone())
                        .or_else(|| own_color(me.as_ref(), &participant.id))
                        .filter(|color| !color_taken(&snapshot.participants, color))
                        .or_else(|| Some(next_color(snapshot)));
                }
                upsert(&mut snapshot.participants, participant);
            }
            snapshot
                .participants
                .sort_by_key(|p| order.iter().position(|id| *id == p.id));
            sync_current_user(snapshot);
        });
    }

    /// Drop everyone except the current user.
    pub fn clear_others(&self) {
        self.tx.send_if_modified(|snapshot| {
            let me = snapshot.current_user.as_ref().map(|p| p.id.clone());
            let before = snapshot.participants.len();
            snapshot
                .participants
                .retain(|p| Some(&p.id) == me.as_ref());
            snapshot.participants.len() != before
        });
    }

    /// Back to the initial empty state (sign-out).
    pub fn reset(&self) {
        self.tx.send_replace(PresenceSnapshot::default());
    }
}

fn own_color(current_user: Option<&Participant>, id: &str) -> Option<String> {
    current_user
        .filter(|me| me.id == id)
        .and_then(|me| me.color_tag.clone())
}

fn color_taken(participants: &[Participant], color: &str) -> bool {
    participants
        .iter()
        .any(|p| p.color_tag.as_deref() == Some(color))
}

/// Like [`assign_color`], but the current user's colour counts as taken even before
/// their own entry arrives.
fn next_color(snapshot: &PresenceSnapshot) -> String {
    let mut taken = snapshot.participants.clone();
    if let Some(me) = &snapshot.current_user
        && snapshot.participant(&me.id).is_none()
    {
        taken.push(me.clone());
    }
    assign_color(&taken)
}

/// Keep the current user's colour equal to their entry in the participant list.
fn sync_current_user(snapshot: &mut PresenceSnapshot) {
    let Some(me) = snapshot.current_user.as_mut() else {
        return;
    };
    if let Some(entry) = snapshot.participants.iter().find(|p| p.id == me.id) {
        me.color_tag = entry.color_tag.clone();
    }
}

fn upsert(participants: &mut Vec<Participant>, participant: Participant) {
    match participants.iter().position(|p| p.id == participant.id) {
        Some(index) => {
            let existing = &mut participants[index];
            let color_tag = participant.color_tag.or_else(|| existing.color_tag.take());
            *existing = Participant {
                color_tag,
                ..participant
            };
            if existing.color_tag.is_none() {
                let color = assign_color(participants);
                participants[index].color_tag = Some(color);
            }
        }
        None => {
            let color_tag = participant
                .color_tag
                .clone()
                .unwrap_or_else(|| assign_color(participants));
            participants.push(Participant {
                color_tag: Some(color_tag),
                ..participant
            });
        }
    }
}
