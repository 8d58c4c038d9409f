/// A 32-bit sequence number on the wrapped sequence circle.
///
/// The transport counts bytes with 64-bit absolute numbers; on the wire only
/// the low 32 bits travel, offset by the connection's ISN. `wrap` projects an
/// absolute number onto the circle and `unwrap` lifts it back, using a
/// checkpoint to decide which wraparound was meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrap32 {
    raw: u32,
}

/// One full turn of the sequence circle.
const TURN: u64 = 1 << 32;

impl Wrap32 {
    pub fn new(raw: u32) -> Self {
        Wrap32 { raw }
    }

    /// Project the absolute sequence number `n` onto the circle anchored at `isn`
    pub fn wrap(n: u64, isn: Wrap32) -> Self {
        Wrap32 {
            raw: isn.raw.wrapping_add(n as u32),
        }
    }

    /// Lift this wrapped value back to the absolute sequence number closest
    /// to `checkpoint`. When two candidates are equally close, the higher
    /// one wins; the result is never negative.
    pub fn unwrap(&self, isn: Wrap32, checkpoint: u64) -> u64 {
        let offset = u64::from(self.raw.wrapping_sub(isn.raw));

        // Anchor on the turn that starts within half a turn above the
        // checkpoint; the matching value in that turn, or the one exactly a
        // turn below it, is the closest.
        let turns = checkpoint / TURN + u64::from(checkpoint % TURN >= TURN / 2);
        let upper = turns * TURN + offset;
        match upper.checked_sub(TURN) {
            Some(lower) if checkpoint.abs_diff(lower) < checkpoint.abs_diff(upper) => lower,
            _ => upper,
        }
    }
}

// -- Unit tests --
