//! Scripted keyboard input.

use std::str::FromStr;

/// A key held down at `frame` for `hold` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct KeyPress {
    pub frame: u64,
    pub key: String,
    pub hold: u64,
}

impl KeyPress {
    pub const DEFAULT_HOLD: u64 = 1;
}

impl FromStr for KeyPress {
    type Err = String;

    /// Parses `FRAME:KEY[:HOLD]`, e.g. `30:KeyG` or `120:KeyZ:10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let frame = parts
            .next()
            .and_then(|frame| frame.trim().parse::<u64>().ok())
            .ok_or_else(|| format!("invalid frame in key press {s:?}, expected FRAME:KEY[:HOLD]"))?;
        let key = parts
            .next()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| format!("missing key in key press {s:?}, expected FRAME:KEY[:HOLD]"))?
            .to_string();
        let hold = match parts.next() {
            Some(hold) => hold
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|hold| *hold > 0)
                .ok_or_else(|| format!("invalid hold in key press {s:?}, expected 1 or more"))?,
            None => Self::DEFAULT_HOLD,
        };
        if parts.next().is_some() {
            return Err(format!("unexpected trailing input in key press {s:?}"));
        }
        Ok(Self { frame, key, hold })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum KeyEvent {
    Down(String),
    Up(String),
}

/// Replays key presses as the frame count advances.
#[derive(Debug, Default)]
#[must_use]
pub struct ScriptedInput {
    events: Vec<(u64, KeyEvent)>,
    next: usize,
}

impl ScriptedInput {
    pub fn new(presses: impl IntoIterator<Item = KeyPress>) -> Self {
        let mut events = presses
            .into_iter()
            .flat_map(|press| {
                [
                    (press.frame, KeyEvent::Down(press.key.clone())),
                    (press.frame.saturating_add(press.hold), KeyEvent::Up(press.key)),
                ]
            })
            .collect::<Vec<_>>();
        events.sort_by_key(|(frame, _)| *frame);
        Self { events, next: 0 }
    }

    /// Events due at or before `frame` that haven't been returned yet.
    pub fn due(&mut self, frame: u64) -> impl Iterator<Item = &KeyEvent> {
        let start = self.next;
        while self
            .events
            .get(self.next)
            .is_some_and(|(due, _)| *due <= frame)
        {
            self.next += 1;
        }
        self.events[start..self.next].iter().map(|(_, event)| event)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.next >= self.events.len()
    }
}
