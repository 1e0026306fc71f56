use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every generator starts growing from this value so ids are never shorter
/// than four base-36 digits.
pub const ID_WATERMARK: u64 = 802702;

const MAX_GROW: u64 = 17;

/// External ids above this value are never adopted. A generator growing by
/// at most `MAX_GROW` per id cannot reach it, so they cannot collide.
pub const RESERVE_LIMIT: u64 = u64::MAX / 2;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

entity_id!(
    /// Identity of a presentation.
    PresentationId
);
entity_id!(
    /// Identity of a step (slide).
    StepId
);
entity_id!(
    /// Identity of a component placed within a step.
    ComponentId
);

/// Produces short, monotonically growing base-36 ids.
///
/// Ids grow by a random step so that two generators seeded differently are
/// unlikely to collide, while `reserve` lets ids produced elsewhere (a loaded
/// document, a remote peer) be adopted without ever being produced again.
#[derive(Debug)]
pub struct IdGenerator {
    last: u64,
    rng: StdRng,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last: ID_WATERMARK,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            last: ID_WATERMARK,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn watermark(&self) -> u64 {
        self.last
    }

    pub fn next(&mut self) -> String {
        self.last = self.last.saturating_add(self.rng.gen_range(1..=MAX_GROW));
        to_base36(self.last)
    }

    pub fn next_id<T: From<String>>(&mut self) -> T {
        T::from(self.next())
    }

    /// Adopt an externally generated id. Returns true when the watermark moved.
    pub fn reserve(&mut self, id: &str) -> bool {
        let Some(n) = from_base36(id) else {
            return false;
        };
        if n > RESERVE_LIMIT {
            return false;
        }
        if n >= self.last {
            self.last = n + self.rng.gen_range(0..MAX_GROW);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last = ID_WATERMARK;
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn from_base36(id: &str) -> Option<u64> {
    if id.is_empty() {
        return None;
    }
    u64::from_str_radix(&id.to_ascii_lowercase(), 36).ok()
}
