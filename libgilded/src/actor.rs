use anyhow::anyhow;
use std::fmt;

/// A character identity, `name` on `server`. Rendered as `name-server`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId {
    pub name: String,
    pub server: String,
}

impl ActorId {
    pub fn new<N: Into<String>, S: Into<String>>(name: N, server: S) -> ActorId {
        ActorId {
            name: name.into(),
            server: server.into(),
        }
    }

    /// Build from a TradeSkillMaster owner label, `Name - Faction - Realm`.
    /// Labels of any other shape are kept whole as the name.
    pub fn from_owner_label(label: &str) -> ActorId {
        let parts: Vec<&str> = label.split(" - ").map(str::trim).collect();
        match parts.as_slice() {
            [name, _faction, realm] => ActorId::new(*name, *realm),
            [name, realm] => ActorId::new(*name, *realm),
            _ => ActorId::new(label.trim(), ""),
        }
    }

    /// Parse a player reference, `Name-Server` or bare `Name`. A bare name
    /// takes `default_server`; the returned flag tells whether it did.
    pub fn with_default_server(player: &str, default_server: &str) -> (ActorId, bool) {
        match ActorId::try_from(player) {
            Ok(actor) => (actor, false),
            Err(_) => (ActorId::new(player.trim(), default_server), true),
        }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}-{}", self.name, self.server)
        }
    }
}

impl TryFrom<&str> for ActorId {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().rsplit_once('-') {
            Some((name, server)) if !name.trim().is_empty() && !server.trim().is_empty() => {
                Ok(ActorId::new(name.trim(), server.trim()))
            }
            _ => Err(anyhow!("input `{}' is not a valid name-server pair", s)),
        }
    }
}

/// Who a balance belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Holder {
    Character(ActorId),
    Warbank,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Character(actor) => write!(f, "{}", actor),
            Holder::Warbank => write!(f, "warbank"),
        }
    }
}
