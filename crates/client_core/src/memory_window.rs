//! Re-chunks a flat byte sequence into fixed-width display rows anchored at a
//! user-chosen offset.

use shared::domain::Address;
use thiserror::Error;

/// Bytes per display row. Shared with the engine's own addressing.
pub const ROW_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("invalid memory offset '{0}'; expected a non-negative base 16 value")]
    InvalidOffset(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRow {
    pub address: Address,
    pub cells: Vec<u8>,
    /// Number of leading "no data" cells when the row is a partial first row.
    pub pad: u32,
}

impl MemoryRow {
    /// Cells left-padded to [`ROW_WIDTH`]; `None` marks a pad cell.
    pub fn padded_cells(&self) -> impl Iterator<Item = Option<u8>> + '_ {
        std::iter::repeat(None)
            .take(self.pad as usize)
            .chain(self.cells.iter().copied().map(Some))
    }

    pub fn is_full(&self) -> bool {
        self.cells.len() == ROW_WIDTH
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryWindow {
    pub base_offset: Address,
    pub rows: Vec<MemoryRow>,
}

impl MemoryWindow {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.cells.is_empty())
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|row| row.cells.len()).sum()
    }

    /// Index of the row whose address range covers `address`, for scrolling.
    pub fn row_index_for(&self, address: Address) -> Option<usize> {
        self.rows.iter().position(|row| {
            let start = u64::from(row.address);
            address as u64 >= start && (address as u64) < start + ROW_WIDTH as u64
        })
    }
}

/// Materializes the display rows for `sequence` anchored at `offset`.
///
/// Pure: the same inputs always produce the same window. Bytes that would
/// fall past the last row of the address space are not shown.
pub fn window(sequence: &[u8], offset: Address) -> MemoryWindow {
    let width = ROW_WIDTH as u32;

    // Too short to chunk: the engine is still loading or memory is tiny.
    if sequence.len() < ROW_WIDTH {
        return MemoryWindow {
            base_offset: 0,
            rows: vec![MemoryRow {
                address: 0,
                cells: sequence.to_vec(),
                pad: 0,
            }],
        };
    }

    let first_row_size = (offset % width) as usize;
    let base = offset - offset % width;
    let mut next = Some(base);
    let mut rows = Vec::with_capacity(sequence.len() / ROW_WIDTH + 2);
    let mut rest = sequence;

    if first_row_size > 0 {
        let take = first_row_size.min(rest.len());
        let (head, tail) = rest.split_at(take);
        rows.push(MemoryRow {
            address: base,
            cells: head.to_vec(),
            pad: (ROW_WIDTH - first_row_size) as u32,
        });
        rest = tail;
        next = base.checked_add(width);
    }

    for chunk in rest.chunks(ROW_WIDTH) {
        // Rows end at the top of the address space.
        let Some(address) = next else {
            break;
        };
        rows.push(MemoryRow {
            address,
            cells: chunk.to_vec(),
            pad: 0,
        });
        next = address.checked_add(width);
    }

    MemoryWindow {
        base_offset: offset,
        rows,
    }
}

/// Parses a user-entered base 16 offset, with or without a `0x` prefix.
pub fn parse_offset(input: &str) -> Result<Address, WindowError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(WindowError::InvalidOffset(input.to_string()));
    }
    Address::from_str_radix(digits, 16).map_err(|_| WindowError::InvalidOffset(input.to_string()))
}

/// Windows `sequence` at the offset typed by the user, falling back to offset
/// 0 and returning the validation error alongside when the text is invalid.
pub fn window_from_input(sequence: &[u8], input: &str) -> (MemoryWindow, Option<WindowError>) {
    match parse_offset(input) {
        Ok(offset) => (window(sequence, offset), None),
        Err(err) => (window(sequence, 0), Some(err)),
    }
}

#[cfg(test)]
#[path = "tests/memory_window_tests.rs"]
mod tests;
