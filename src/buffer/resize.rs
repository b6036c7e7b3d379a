//! Content-preserving moves and resizes.
//!
//! Every operation validates its whole geometry and acquires its staging
//! memory before the first byte moves, so an error never leaves a
//! half-applied edit behind.

use super::{Buffer, Release, SafePtr};
use crate::error::BufferError;
use crate::memory::backend::Backend;
use crate::memory::copy;

/// UTF-16 code unit width.
const CHAR: usize = 2;

/// A validated slide: `length` bytes at `index` end up at `dest`, and the
/// bytes they pass over end up where the block was.
#[derive(Clone, Copy, Debug)]
struct Move {
    index: usize,
    length: usize,
    dest: usize,
}

impl Move {
    fn new(
        operation: &'static str,
        index: usize,
        length: usize,
        offset: isize,
        capacity: usize,
    ) -> Result<Self, BufferError> {
        let out = |at: isize| BufferError::out_of_range(operation, at, length, capacity);
        let signed_index = isize::try_from(index).unwrap_or(isize::MAX);
        match index.checked_add(length) {
            Some(end) if end <= capacity => {}
            _ => return Err(out(signed_index)),
        }
        let dest = index
            .checked_add_signed(offset)
            .ok_or_else(|| out(signed_index.saturating_add(offset)))?;
        match dest.checked_add(length) {
            Some(end) if end <= capacity => Ok(Self {
                index,
                length,
                dest,
            }),
            _ => Err(out(signed_index.saturating_add(offset))),
        }
    }

    fn span(&self) -> usize {
        self.index.abs_diff(self.dest)
    }

    fn start(&self) -> usize {
        self.index.min(self.dest)
    }

    /// Bytes touched by the move.
    fn region(&self) -> usize {
        self.length + self.span()
    }

    /// Equal-width neighbours of a native scalar width swap in place.
    fn is_swap(&self) -> bool {
        self.span() == self.length && matches!(self.length, 1 | 2 | 4 | 8)
    }

    fn is_noop(&self) -> bool {
        self.span() == 0 || self.length == 0
    }

    fn needs_staging(&self) -> bool {
        !self.is_noop() && !self.is_swap()
    }

    fn reversed(self) -> Self {
        Self {
            index: self.dest,
            length: self.length,
            dest: self.index,
        }
    }
}

fn chars(operation: &'static str, units: usize, capacity: usize) -> Result<usize, BufferError> {
    units.checked_mul(CHAR).ok_or_else(|| {
        BufferError::out_of_range(operation, isize::MAX, units, capacity)
    })
}

impl<R: Release> Buffer<R> {
    /// Move the `length`-byte block at `index` by `offset` bytes, exchanging
    /// it with the bytes it passes over.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if the block or its destination
    /// leaves the buffer, before anything is modified.
    pub fn slide(&mut self, index: usize, length: usize, offset: isize) -> Result<(), BufferError> {
        if offset == 0 {
            return Ok(());
        }
        let mv = Move::new("slide", index, length, offset, self.len())?;
        let mut staging = staging_for(&[mv])?;
        self.exchange(mv, &mut staging);
        Ok(())
    }

    /// [`slide`](Self::slide) in UTF-16 units.
    ///
    /// # Errors
    ///
    /// See [`slide`](Self::slide).
    pub fn slide_chars(
        &mut self,
        index: usize,
        length: usize,
        offset: isize,
    ) -> Result<(), BufferError> {
        let capacity = self.len();
        let offset = offset.checked_mul(CHAR as isize).ok_or_else(|| {
            BufferError::out_of_range("slide_chars", offset, length, capacity)
        })?;
        self.slide(
            chars("slide_chars", index, capacity)?,
            chars("slide_chars", length, capacity)?,
            offset,
        )
    }

    /// Grow by `amount` bytes at `index`, shifting `[index, len)` up. The gap
    /// receives `fill`, zero-padded when shorter; bytes of `fill` past
    /// `amount` are ignored. Returns the new length.
    ///
    /// An unallocated buffer is allocated on the process heap.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` when `index > len`, or the allocation failure.
    pub fn push_out(
        &mut self,
        index: usize,
        amount: usize,
        fill: Option<&[u8]>,
    ) -> Result<usize, BufferError> {
        let old = self.len();
        if index > old {
            return Err(BufferError::out_of_range(
                "push_out",
                isize::try_from(index).unwrap_or(isize::MAX),
                amount,
                old,
            ));
        }
        if amount == 0 {
            return Ok(old);
        }
        let new_len = old
            .checked_add(amount)
            .ok_or_else(|| BufferError::out_of_range("push_out", 0, amount, old))?;
        let mv = Move {
            index,
            length: old - index,
            dest: index + amount,
        };
        let mut staging = staging_for(&[mv])?;
        self.realloc(new_len)?;
        self.exchange(mv, &mut staging);

        let filled = fill.map_or(0, |bytes| bytes.len().min(amount));
        if let Some(bytes) = fill {
            self.set_bytes(index, &bytes[..filled])?;
        }
        self.zero_memory(index + filled..index + amount)?;
        Ok(self.len())
    }

    /// [`push_out`](Self::push_out) in UTF-16 units.
    ///
    /// # Errors
    ///
    /// See [`push_out`](Self::push_out).
    pub fn push_out_chars(
        &mut self,
        index: usize,
        amount: usize,
        fill: Option<&[u16]>,
    ) -> Result<usize, BufferError> {
        let capacity = self.len();
        let fill: Option<Vec<u8>> =
            fill.map(|units| units.iter().flat_map(|u| u.to_le_bytes()).collect());
        self.push_out(
            chars("push_out_chars", index, capacity)?,
            chars("push_out_chars", amount, capacity)?,
            fill.as_deref(),
        )
    }

    /// Remove `amount` bytes at `index`, shifting the tail down. Returns the
    /// new length.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` when `[index, index + amount)` leaves the buffer,
    /// or the shrink's failure, with the content restored.
    pub fn pull_in(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        self.check_range("pull_in", index, amount)?;
        let old = self.len();
        if amount == 0 {
            return Ok(old);
        }
        let mv = Move {
            index: index + amount,
            length: old - index - amount,
            dest: index,
        };
        let mut staging = staging_for(&[mv])?;
        self.exchange(mv, &mut staging);
        if let Err(e) = self.realloc(old - amount) {
            // A failed realloc leaves the block untouched, so undoing the move
            // restores the original content.
            self.exchange(mv.reversed(), &mut staging);
            return Err(e);
        }
        Ok(self.len())
    }

    /// [`pull_in`](Self::pull_in) in UTF-16 units.
    ///
    /// # Errors
    ///
    /// See [`pull_in`](Self::pull_in).
    pub fn pull_in_chars(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        let capacity = self.len();
        self.pull_in(
            chars("pull_in_chars", index, capacity)?,
            chars("pull_in_chars", amount, capacity)?,
        )
    }

    /// Insert `bytes` at `index`.
    ///
    /// # Errors
    ///
    /// See [`push_out`](Self::push_out).
    pub fn insert(&mut self, index: usize, bytes: &[u8]) -> Result<usize, BufferError> {
        self.push_out(index, bytes.len(), Some(bytes))
    }

    /// Insert UTF-16 `units` at char index `index`.
    ///
    /// # Errors
    ///
    /// See [`push_out`](Self::push_out).
    pub fn insert_chars(&mut self, index: usize, units: &[u16]) -> Result<usize, BufferError> {
        self.push_out_chars(index, units.len(), Some(units))
    }

    /// Delete `amount` bytes at `index`.
    ///
    /// # Errors
    ///
    /// See [`pull_in`](Self::pull_in).
    pub fn delete(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        self.pull_in(index, amount)
    }

    /// Delete `amount` UTF-16 units at char index `index`.
    ///
    /// # Errors
    ///
    /// See [`pull_in`](Self::pull_in).
    pub fn delete_chars(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        self.pull_in_chars(index, amount)
    }

    /// Open `amount` zero bytes on each side of the byte at `index`.
    /// [`consume`](Self::consume)`(index + amount, amount)` undoes it.
    ///
    /// An unallocated buffer is allocated with `2 * amount` bytes.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` when `index` is not inside the buffer, or the
    /// allocation failure.
    pub fn part(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        self.part_with("part", index, amount, 1)
    }

    /// [`part`](Self::part) around the UTF-16 unit at char index `index`.
    ///
    /// # Errors
    ///
    /// See [`part`](Self::part).
    pub fn part_chars(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        let capacity = self.len();
        self.part_with(
            "part_chars",
            chars("part_chars", index, capacity)?,
            chars("part_chars", amount, capacity)?,
            CHAR,
        )
    }

    /// Remove `amount` bytes on each side of the byte at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` unless `amount <= index` and
    /// `index + 1 + amount <= len`, or the shrink's failure with the content
    /// restored.
    pub fn consume(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        self.consume_with("consume", index, amount, 1)
    }

    /// [`consume`](Self::consume) around the UTF-16 unit at char index `index`.
    ///
    /// # Errors
    ///
    /// See [`consume`](Self::consume).
    pub fn consume_chars(&mut self, index: usize, amount: usize) -> Result<usize, BufferError> {
        let capacity = self.len();
        self.consume_with(
            "consume_chars",
            chars("consume_chars", index, capacity)?,
            chars("consume_chars", amount, capacity)?,
            CHAR,
        )
    }

    /// Reverse the buffer byte by byte, or UTF-16 unit by unit when
    /// `as_chars` is set (a trailing odd byte stays in place).
    pub fn reverse(&mut self, as_chars: bool) {
        let bytes = self.as_mut_slice();
        if !as_chars {
            bytes.reverse();
            return;
        }
        let units = bytes.len() / CHAR;
        for i in 0..units / 2 {
            let (a, b) = (i * CHAR, (units - 1 - i) * CHAR);
            bytes.swap(a, b);
            bytes.swap(a + 1, b + 1);
        }
    }

    /// `amount` bytes each side of the `unit`-byte pivot at `index`.
    fn part_with(
        &mut self,
        operation: &'static str,
        index: usize,
        amount: usize,
        unit: usize,
    ) -> Result<usize, BufferError> {
        let both = amount
            .checked_mul(2)
            .ok_or_else(|| BufferError::out_of_range(operation, 0, amount, self.len()))?;
        if !self.is_allocated() {
            self.realloc(both)?;
            return Ok(self.len());
        }
        self.check_range(operation, index, unit)?;
        let old = self.len();
        if amount == 0 {
            return Ok(old);
        }
        let new_len = old
            .checked_add(both)
            .ok_or_else(|| BufferError::out_of_range(operation, 0, both, old))?;
        let suffix = Move {
            index: index + unit,
            length: old - index - unit,
            dest: index + unit + both,
        };
        let pivot = Move {
            index,
            length: unit,
            dest: index + amount,
        };
        let mut staging = staging_for(&[suffix, pivot])?;
        self.realloc(new_len)?;
        self.exchange(suffix, &mut staging);
        self.exchange(pivot, &mut staging);
        self.zero_memory(index..index + amount)?;
        self.zero_memory(index + amount + unit..index + both + unit)?;
        Ok(self.len())
    }

    fn consume_with(
        &mut self,
        operation: &'static str,
        index: usize,
        amount: usize,
        unit: usize,
    ) -> Result<usize, BufferError> {
        let old = self.len();
        let fits = amount <= index
            && index
                .checked_add(unit)
                .and_then(|end| end.checked_add(amount))
                .is_some_and(|end| end <= old);
        if !fits {
            return Err(BufferError::out_of_range(
                operation,
                isize::try_from(index).unwrap_or(isize::MAX),
                amount,
                old,
            ));
        }
        if amount == 0 {
            return Ok(old);
        }
        let pivot = Move {
            index,
            length: unit,
            dest: index - amount,
        };
        let suffix = Move {
            index: index + unit + amount,
            length: old - index - unit - amount,
            dest: index + unit - amount,
        };
        let mut staging = staging_for(&[pivot, suffix])?;
        self.exchange(pivot, &mut staging);
        self.exchange(suffix, &mut staging);
        if let Err(e) = self.realloc(old - 2 * amount) {
            // Undo in reverse order over the untouched block.
            self.exchange(suffix.reversed(), &mut staging);
            self.exchange(pivot.reversed(), &mut staging);
            return Err(e);
        }
        Ok(self.len())
    }

    /// Apply a validated move. `staging` must hold at least `mv.region()`
    /// bytes unless the move is a swap or a no-op.
    fn exchange(&mut self, mv: Move, staging: &mut SafePtr) {
        debug_assert!(mv.index.max(mv.dest) + mv.length <= self.len());
        if mv.is_noop() {
            return;
        }
        // Safety: the move lies inside the buffer (checked by every caller)
        // and staging is a distinct block of at least `region` bytes.
        unsafe {
            let (a, b) = (self.raw_at(mv.index), self.raw_at(mv.dest));
            match mv.length {
                1 if mv.is_swap() => return copy::swap_scalar::<u8>(a, b),
                2 if mv.is_swap() => return copy::swap_scalar::<u16>(a, b),
                4 if mv.is_swap() => return copy::swap_scalar::<u32>(a, b),
                8 if mv.is_swap() => return copy::swap_scalar::<u64>(a, b),
                _ => {}
            }

            debug_assert!(staging.len() >= mv.region());
            let span = mv.span();
            let start = self.raw_at(mv.start());
            let tmp = staging.raw_at(0);
            if mv.dest > mv.index {
                // [block][span] -> [span][block]
                copy::copy_block(tmp, start.add(mv.length), span);
                copy::copy_block(tmp.add(span), start, mv.length);
            } else {
                // [span][block] -> [block][span]
                copy::copy_block(tmp, start.add(span), mv.length);
                copy::copy_block(tmp.add(mv.length), start, span);
            }
            copy::copy_block(start, tmp, mv.region());
        }
    }
}

/// Heap scratch space large enough for every move that needs it.
fn staging_for(moves: &[Move]) -> Result<SafePtr, BufferError> {
    let size = moves
        .iter()
        .filter(|mv| mv.needs_staging())
        .map(Move::region)
        .max()
        .unwrap_or(0);
    let mut staging = SafePtr::new();
    staging.alloc(size, Backend::Heap)?;
    Ok(staging)
}
