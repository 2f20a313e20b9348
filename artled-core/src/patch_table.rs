//! This module contains the patch table, the mapping from Art-Net universes onto ranges of the LED strip.
//!
//! The strip is split into up to [MAX_UNIVERSES] consecutive ranges ("slots"). Slot `i` owns the LEDs
//! `offsets[i]..offsets[i + 1]` and is fed by the universe `universe_patch[i]`.
//!
//! The table holds no lock of its own. It is shared between the receiver and the control port behind a
//! single `RwLock`, see the `artled` crate.

use core::{
    fmt::{self, Display, Write},
    ops::Range,
};

use heapless::String;

use crate::{
    definitions::{CHANNELS_PER_LED, MAX_LEDS, MAX_UNIVERSES},
    packet::ArtDmx,
    pixel::PixelSink,
    port_address::PortAddress,
};

/// Number of entries of the offsets array, one more than slots so every slot has an end.
pub const OFFSETS_LEN: usize = MAX_UNIVERSES + 1;

/// Enough for the longest possible state report, [MAX_UNIVERSES] lines of two five digit numbers.
pub const STATE_REPORT_CAPACITY: usize = 512;

/// Universe to LED range mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchTable {
    universe_count: usize,
    active_led_count: u16,
    universe_patch: [PortAddress; MAX_UNIVERSES],
    offsets: [u16; OFFSETS_LEN],
}

impl Default for PatchTable {
    /// Ten universes of ten LEDs each, universe `i` patched to slot `i`.
    fn default() -> Self {
        let mut universe_patch = [PortAddress::MIN; MAX_UNIVERSES];
        let mut offsets = [0; OFFSETS_LEN];
        for (i, address) in universe_patch.iter_mut().enumerate() {
            *address = PortAddress::new(i as u16).unwrap_or_default();
        }
        for (i, offset) in offsets.iter_mut().enumerate() {
            *offset = (i * Self::DEFAULT_LEDS_PER_UNIVERSE) as u16;
        }

        Self {
            universe_count: MAX_UNIVERSES,
            active_led_count: (MAX_UNIVERSES * Self::DEFAULT_LEDS_PER_UNIVERSE) as u16,
            universe_patch,
            offsets,
        }
    }
}

impl PatchTable {
    const DEFAULT_LEDS_PER_UNIVERSE: usize = 10;

    /// Assembles a table from raw values, e.g. ones read back from storage.
    ///
    /// Slots past `universe_count` are kept as they are so a later increase of the universe count brings them back.
    ///
    /// # Errors
    /// Returned if any of the invariants of the table does not hold:
    /// - `universe_count` in `1..=MAX_UNIVERSES`
    /// - `active_led_count` in `1..=MAX_LEDS`
    /// - every patched value is a valid [PortAddress]
    /// - `offsets[..=universe_count]` is non-decreasing and ends in `active_led_count`
    pub fn from_parts(
        universe_count: u16,
        active_led_count: u16,
        universe_patch: [u16; MAX_UNIVERSES],
        offsets: [u16; OFFSETS_LEN],
    ) -> Result<Self, PatchTableError> {
        let count = universe_count as usize;
        if !(1..=MAX_UNIVERSES).contains(&count) {
            Err(PatchTableError::InvalidUniverseCount(universe_count))?;
        }

        if !(1..=MAX_LEDS).contains(&(active_led_count as usize)) {
            Err(PatchTableError::InvalidActiveLedCount(active_led_count))?;
        }

        let mut patch = [PortAddress::MIN; MAX_UNIVERSES];
        for (slot, raw) in universe_patch.iter().enumerate() {
            patch[slot] = PortAddress::new(*raw).map_err(|_| PatchTableError::InvalidPatch { slot, value: *raw })?;
        }

        if let Some(slot) = offsets[..=count].windows(2).position(|w| w[0] > w[1]) {
            Err(PatchTableError::OffsetsOutOfOrder(slot + 1))?;
        }

        if offsets[count] != active_led_count {
            Err(PatchTableError::OffsetMismatch {
                offset: offsets[count],
                active_led_count,
            })?;
        }

        Ok(Self {
            universe_count: count,
            active_led_count,
            universe_patch: patch,
            offsets,
        })
    }

    /// Number of patched universes
    pub const fn universe_count(&self) -> usize {
        self.universe_count
    }

    /// Number of LEDs driven
    pub const fn active_led_count(&self) -> u16 {
        self.active_led_count
    }

    /// The patched universes of the used slots
    pub fn universe_patch(&self) -> &[PortAddress] {
        &self.universe_patch[..self.universe_count]
    }

    /// The offsets of the used slots plus the end of the last one
    pub fn offsets(&self) -> &[u16] {
        &self.offsets[..=self.universe_count]
    }

    /// All patch entries as raw values, including unused slots, for storage.
    pub fn raw_universe_patch(&self) -> [u16; MAX_UNIVERSES] {
        self.universe_patch.map(u16::from)
    }

    /// All offsets, including unused slots, for storage.
    pub const fn raw_offsets(&self) -> [u16; OFFSETS_LEN] {
        self.offsets
    }

    /// Finds the slot a universe is patched to.
    ///
    /// If a universe is patched to more than one slot the first one wins.
    pub fn lookup_universe(&self, address: PortAddress) -> Option<usize> {
        self.universe_patch().iter().position(|a| *a == address)
    }

    /// The LEDs owned by `slot`, `None` for slots that are not in use.
    pub fn led_range(&self, slot: usize) -> Option<Range<usize>> {
        if slot >= self.universe_count {
            return None;
        }

        let end = (self.offsets[slot + 1] as usize).min(MAX_LEDS);
        let start = (self.offsets[slot] as usize).min(end);
        Some(start..end)
    }

    /// Copies the channels of an ArtDmx packet onto the LEDs of the slot its universe is patched to.
    ///
    /// At most `min(range width, declared length / 3, received channels / 3)` pixels are set.
    /// Returns the slot and the number of pixels set, `None` if the universe isn't patched.
    pub fn route_dmx<S: PixelSink>(&self, dmx: &ArtDmx<'_>, sink: &mut S) -> Option<(usize, usize)> {
        let slot = self.lookup_universe(dmx.port_address)?;
        let range = self.led_range(slot)?;

        let mut count = 0;
        for (index, color) in range.zip(dmx.pixels()) {
            sink.set_pixel(index, color);
            count += 1;
        }
        debug_assert!(count <= dmx.channels().len() / CHANNELS_PER_LED);

        sink.universe_complete(slot);
        Some((slot, count))
    }

    /// Overwrites the patch of the first slots with the given addresses.
    ///
    /// `None` entries and entries past the universe count leave their slot unchanged.
    pub fn set_patch(&mut self, addresses: &[Option<PortAddress>]) {
        for (slot, address) in addresses.iter().enumerate().take(self.universe_count) {
            if let Some(address) = address {
                self.universe_patch[slot] = *address;
            }
        }
    }

    /// Moves the starts of the first slots.
    ///
    /// A value is only taken if it is above the previous slot's offset and below the active LED count.
    /// `None` or rejected values keep the slot's offset, which then becomes the baseline for the next value.
    /// Afterwards slots that ended up below their predecessor are raised to it, leaving them empty.
    pub fn set_offsets(&mut self, offsets: &[Option<u16>]) {
        let mut previous = 0;
        for (slot, offset) in offsets.iter().enumerate().take(self.universe_count) {
            if let Some(offset) = *offset {
                if offset > previous && offset < self.active_led_count {
                    self.offsets[slot] = offset;
                }
            }
            previous = self.offsets[slot];
        }

        self.normalize_offsets();
    }

    /// Changes the number of driven LEDs.
    ///
    /// Only accepted if the last slot keeps at least one LED and the strip stays within [MAX_LEDS].
    pub fn set_active_led_count(&mut self, active_led_count: u16) -> bool {
        let last_start = self.offsets[self.universe_count - 1];
        if active_led_count <= last_start || active_led_count as usize > MAX_LEDS {
            return false;
        }

        self.active_led_count = active_led_count;
        self.offsets[self.universe_count] = active_led_count;
        true
    }

    /// Changes the number of patched universes, the last slot is extended to the active LED count.
    ///
    /// Only accepted for `1..=MAX_UNIVERSES`.
    pub fn set_universe_count(&mut self, universe_count: u16) -> bool {
        let count = universe_count as usize;
        if !(1..=MAX_UNIVERSES).contains(&count) {
            return false;
        }

        self.universe_count = count;
        self.offsets[count] = self.active_led_count;
        self.normalize_offsets();
        true
    }

    /// Clamps every used offset between its predecessor and the active LED count.
    fn normalize_offsets(&mut self) {
        let mut previous = 0;
        for offset in &mut self.offsets[..self.universe_count] {
            *offset = (*offset).clamp(previous, self.active_led_count);
            previous = *offset;
        }
    }

    /// Human readable dump of the table, as sent over the control port.
    pub fn state_report(&self) -> StateReport<'_> {
        StateReport(self)
    }

    /// Renders the [Self::state_report] into a fixed capacity string.
    pub fn render_text(&self) -> String<STATE_REPORT_CAPACITY> {
        let mut text = String::new();
        // STATE_REPORT_CAPACITY covers the longest possible report
        let _ = write!(text, "{}", self.state_report());
        text
    }
}

/// The table state as text, CRLF terminated lines:
///
/// ```text
/// \tACTIVE_LEDS: 100
///
/// \tNUM_UNIS: 10
///
/// \tOFFSETS\tPATCH
/// \t0:\t0
/// \t10:\t1
/// ...
///
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StateReport<'a>(&'a PatchTable);

impl Display for StateReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.0;
        write!(f, "\tACTIVE_LEDS: {}\r\n", table.offsets[table.universe_count])?;
        write!(f, "\r\n")?;
        write!(f, "\tNUM_UNIS: {}\r\n", table.universe_count)?;
        write!(f, "\r\n")?;
        write!(f, "\tOFFSETS\tPATCH\r\n")?;
        for (offset, address) in table.offsets.iter().zip(table.universe_patch()) {
            write!(f, "\t{offset}:\t{address}\r\n")?;
        }
        write!(f, "\r\n")
    }
}

/// Reasons a set of raw values doesn't make a valid [PatchTable]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PatchTableError {
    /// Universe count outside `1..=MAX_UNIVERSES`.
    #[error("Invalid universe count. Must be in the range [1 - {MAX_UNIVERSES}], universe count: {0}")]
    InvalidUniverseCount(u16),

    /// Active LED count outside `1..=MAX_LEDS`.
    #[error("Invalid active LED count. Must be in the range [1 - {MAX_LEDS}], active LED count: {0}")]
    InvalidActiveLedCount(u16),

    /// A patch entry is not a valid port-address.
    #[error("Slot {slot} is patched to invalid port-address {value}")]
    InvalidPatch {
        /// The offending slot
        slot: usize,
        /// Its raw value
        value: u16,
    },

    /// The offset of the given slot is lower than the one before it.
    #[error("Offset of slot {0} is lower than the offset before it")]
    OffsetsOutOfOrder(usize),

    /// The end of the last slot is not the active LED count.
    #[error("Last offset {offset} does not match the active LED count {active_led_count}")]
    OffsetMismatch {
        /// The end of the last slot
        offset: u16,
        /// The active LED count
        active_led_count: u16,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        definitions::ARTNET_HEADER,
        packet::ArtNetPacket,
        pixel::{PixelBuffer, Rgb},
    };

    fn addr(raw: u16) -> PortAddress {
        PortAddress::new(raw).unwrap()
    }

    fn assert_invariants(table: &PatchTable) {
        let n = table.universe_count();
        assert!((1..=MAX_UNIVERSES).contains(&n));
        assert!(table.active_led_count() as usize <= MAX_LEDS);
        assert_eq!(table.offsets().len(), n + 1);
        assert!(table.offsets().windows(2).all(|w| w[0] <= w[1]), "offsets out of order: {:?}", table.offsets());
        assert_eq!(table.offsets()[n], table.active_led_count());
    }

    #[test]
    fn test_defaults() {
        let table = PatchTable::default();
        assert_eq!(table.universe_count(), 10);
        assert_eq!(table.active_led_count(), 100);
        assert_eq!(table.offsets(), &[0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(table.raw_universe_patch(), [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_invariants(&table);
    }

    #[test]
    fn test_lookup_first_match_wins() {
        let mut table = PatchTable::default();
        table.set_patch(&[Some(addr(7)), Some(addr(7)), Some(addr(7))]);

        assert_eq!(table.lookup_universe(addr(7)), Some(0));
        assert_eq!(table.lookup_universe(addr(3)), Some(3));
        assert_eq!(table.lookup_universe(addr(1)), None);
    }

    #[test]
    fn test_lookup_ignores_unused_slots() {
        let mut table = PatchTable::default();
        assert!(table.set_universe_count(4));

        assert_eq!(table.lookup_universe(addr(3)), Some(3));
        assert_eq!(table.lookup_universe(addr(4)), None);
        assert_eq!(table.lookup_universe(addr(9)), None);
    }

    #[test]
    fn test_led_range() {
        let table = PatchTable::default();
        assert_eq!(table.led_range(0), Some(0..10));
        assert_eq!(table.led_range(9), Some(90..100));
        assert_eq!(table.led_range(10), None);
    }

    #[test]
    fn test_render_text() {
        let mut table = PatchTable::default();
        assert!(table.set_universe_count(2));
        table.set_patch(&[Some(addr(5)), Some(addr(300))]);

        assert_eq!(
            table.render_text().as_str(),
            "\tACTIVE_LEDS: 100\r\n\r\n\tNUM_UNIS: 2\r\n\r\n\tOFFSETS\tPATCH\r\n\t0:\t5\r\n\t10:\t300\r\n\r\n"
        );
    }

    #[test]
    fn test_render_text_fits_largest_table() {
        let offsets = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 600];
        let table = PatchTable::from_parts(10, 600, [PortAddress::MAX_RAW; MAX_UNIVERSES], offsets).unwrap();

        let text = table.render_text();
        assert!(text.ends_with("\t9:\t32767\r\n\r\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with('\t')).count(), 3 + 10);
    }

    #[test]
    fn test_patch_only_first_slots() {
        let mut table = PatchTable::default();
        table.set_patch(&[Some(addr(5)), Some(addr(5)), Some(addr(5))]);
        assert_eq!(table.raw_universe_patch(), [5, 5, 5, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_patch_skips_invalid_and_extra_values() {
        let mut table = PatchTable::default();
        assert!(table.set_universe_count(2));
        table.set_patch(&[None, Some(addr(42)), Some(addr(43))]);
        assert_eq!(table.universe_patch(), &[addr(0), addr(42)]);
        assert_eq!(table.raw_universe_patch()[2], 2);
    }

    #[test]
    fn test_offsets_third_value_rejected() {
        let mut table = PatchTable::default();
        table.set_offsets(&[Some(0), Some(15), Some(5)]);
        assert_eq!(table.offsets(), &[0, 15, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_invariants(&table);
    }

    #[test]
    fn test_offsets_all_accepted() {
        let mut table = PatchTable::default();
        table.set_offsets(&[Some(0), Some(15), Some(25)]);
        assert_eq!(table.offsets(), &[0, 15, 25, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_invariants(&table);
    }

    #[test]
    fn test_offsets_slot_zero() {
        // 0 is not above the starting baseline of 0, any positive value is
        let mut table = PatchTable::default();
        table.set_offsets(&[Some(0)]);
        assert_eq!(table.offsets()[0], 0);

        table.set_offsets(&[Some(5)]);
        assert_eq!(table.offsets()[0], 5);
        assert_eq!(table.led_range(0), Some(5..10));
    }

    #[test]
    fn test_offsets_rejected_at_active_led_count() {
        let mut table = PatchTable::default();
        table.set_offsets(&[None, Some(100)]);
        assert_eq!(table.offsets()[1], 10);

        table.set_offsets(&[None, Some(99)]);
        assert_eq!(table.offsets()[1], 99);
        assert_invariants(&table);
    }

    #[test]
    fn test_offsets_rejected_value_keeps_baseline() {
        let mut table = PatchTable::default();
        // 12 is rejected since it isn't above slot 1 which stays at 50
        table.set_offsets(&[None, Some(50), Some(12), Some(55)]);
        assert_eq!(&table.offsets()[..5], &[0, 50, 50, 55, 55]);
        assert_invariants(&table);
    }

    #[test]
    fn test_offsets_lagging_slots_raised() {
        let mut table = PatchTable::default();
        table.set_offsets(&[Some(0), Some(95)]);
        assert_eq!(table.offsets(), &[0, 95, 95, 95, 95, 95, 95, 95, 95, 95, 100]);
        assert_eq!(table.led_range(2), Some(95..95));
        assert_invariants(&table);
    }

    #[test]
    fn test_active_led_count_too_large() {
        let mut table = PatchTable::default();
        assert!(!table.set_active_led_count(700));
        assert_eq!(table, PatchTable::default());
    }

    #[test]
    fn test_active_led_count_must_exceed_last_offset() {
        let mut table = PatchTable::default();
        assert!(!table.set_active_led_count(90));
        assert!(table.set_active_led_count(91));
        assert_eq!(table.led_range(9), Some(90..91));

        assert!(table.set_active_led_count(150));
        assert_eq!(table.active_led_count(), 150);
        assert_eq!(table.offsets()[10], 150);
        assert!(table.set_active_led_count(600));
        assert_invariants(&table);
    }

    #[test]
    fn test_universe_count() {
        let mut table = PatchTable::default();
        assert!(!table.set_universe_count(0));
        assert!(!table.set_universe_count(11));

        assert!(table.set_universe_count(5));
        assert_eq!(table.offsets(), &[0, 10, 20, 30, 40, 100]);
        assert_invariants(&table);

        // the slots that were cut off come back empty rather than out of order
        assert!(table.set_universe_count(8));
        assert_eq!(table.offsets(), &[0, 10, 20, 30, 40, 100, 100, 100, 100]);
        assert_invariants(&table);
    }

    #[test]
    fn test_from_parts_validation() {
        let table = PatchTable::default();
        let patch = table.raw_universe_patch();
        let offsets = table.raw_offsets();

        assert_eq!(PatchTable::from_parts(10, 100, patch, offsets), Ok(table));
        assert_eq!(
            PatchTable::from_parts(0, 100, patch, offsets),
            Err(PatchTableError::InvalidUniverseCount(0))
        );
        assert_eq!(
            PatchTable::from_parts(11, 100, patch, offsets),
            Err(PatchTableError::InvalidUniverseCount(11))
        );
        assert_eq!(
            PatchTable::from_parts(10, 601, patch, offsets),
            Err(PatchTableError::InvalidActiveLedCount(601))
        );
        assert_eq!(
            PatchTable::from_parts(10, 90, patch, offsets),
            Err(PatchTableError::OffsetMismatch {
                offset: 100,
                active_led_count: 90
            })
        );

        let mut bad_offsets = offsets;
        bad_offsets[4] = 5;
        assert_eq!(
            PatchTable::from_parts(10, 100, patch, bad_offsets),
            Err(PatchTableError::OffsetsOutOfOrder(4))
        );

        let mut bad_patch = patch;
        bad_patch[2] = 0x8000;
        assert_eq!(
            PatchTable::from_parts(10, 100, bad_patch, offsets),
            Err(PatchTableError::InvalidPatch { slot: 2, value: 0x8000 })
        );
    }

    #[test]
    fn test_from_parts_keeps_unused_slots() {
        // offsets past the universe count are not checked
        let offsets = [0, 50, 60, 1, 2, 3, 4, 5, 6, 7, 8];
        let table = PatchTable::from_parts(2, 60, [0; MAX_UNIVERSES], offsets).unwrap();
        assert_eq!(table.raw_offsets(), offsets);
        assert_eq!(table.offsets(), &[0, 50, 60]);
    }

    fn dmx_datagram(port_address: u16, declared_length: u16, data: &[u8]) -> ([u8; 600], usize) {
        let mut buf = [0u8; 600];
        buf[..8].copy_from_slice(&ARTNET_HEADER);
        buf[9] = 0x50;
        buf[14..16].copy_from_slice(&port_address.to_le_bytes());
        buf[16..18].copy_from_slice(&declared_length.to_be_bytes());
        buf[18..18 + data.len()].copy_from_slice(data);
        (buf, 18 + data.len())
    }

    fn route(table: &PatchTable, buf: &[u8], sink: &mut PixelBuffer) -> Option<(usize, usize)> {
        match ArtNetPacket::parse(buf).unwrap() {
            ArtNetPacket::Dmx(dmx) => table.route_dmx(&dmx, sink),
            other => panic!("expected ArtDmx, got {other:?}"),
        }
    }

    #[test]
    fn test_route_truncated_payload() {
        let mut table = PatchTable::default();
        table.set_patch(&[None, None, None, Some(addr(77))]);

        // 10 LEDs declared, 5 LEDs present
        let data: [u8; 15] = core::array::from_fn(|i| i as u8 + 1);
        let (buf, len) = dmx_datagram(77, 30, &data);

        let mut sink = PixelBuffer::new();
        assert_eq!(route(&table, &buf[..len], &mut sink), Some((3, 5)));
        assert_eq!(sink.get(30), Some(Rgb::new(1, 2, 3)));
        assert_eq!(sink.get(34), Some(Rgb::new(13, 14, 15)));
        assert_eq!(sink.get(35), Some(Rgb::BLACK));
        assert_eq!(sink.get(29), Some(Rgb::BLACK));
    }

    #[test]
    fn test_route_clamped_to_range_width() {
        let table = PatchTable::default();
        let (buf, len) = dmx_datagram(1, 512, &[200; 512]);

        let mut sink = PixelBuffer::new();
        assert_eq!(route(&table, &buf[..len], &mut sink), Some((1, 10)));
        assert!(sink.pixels()[10..20].iter().all(|p| *p == Rgb::new(200, 200, 200)));
        assert_eq!(sink.get(9), Some(Rgb::BLACK));
        assert_eq!(sink.get(20), Some(Rgb::BLACK));
    }

    #[test]
    fn test_route_clamped_to_declared_length() {
        let table = PatchTable::default();
        // 3 whole LEDs declared, one channel of a 4th
        let (buf, len) = dmx_datagram(0, 10, &[9; 30]);

        let mut sink = PixelBuffer::new();
        assert_eq!(route(&table, &buf[..len], &mut sink), Some((0, 3)));
        assert_eq!(sink.get(3), Some(Rgb::BLACK));
        assert_eq!(sink.frames(), 1);
    }

    #[test]
    fn test_route_unpatched_universe() {
        let table = PatchTable::default();
        let (buf, len) = dmx_datagram(10, 3, &[1, 2, 3]);

        let mut sink = PixelBuffer::new();
        assert_eq!(route(&table, &buf[..len], &mut sink), None);
        assert_eq!(sink, PixelBuffer::new());
    }

    #[test]
    fn test_route_empty_slot() {
        let mut table = PatchTable::default();
        table.set_offsets(&[None, Some(95)]);
        let (buf, len) = dmx_datagram(2, 3, &[1, 2, 3]);

        let mut sink = PixelBuffer::new();
        assert_eq!(route(&table, &buf[..len], &mut sink), Some((2, 0)));
        assert_eq!(sink, {
            let mut expected = PixelBuffer::new();
            expected.universe_complete(2);
            expected
        });
    }
}
