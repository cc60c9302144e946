//! The software managed TLB. Each of the 32 entries maps an even/odd pair of pages. Installed
//! entries are flattened into two page tables, one for loads and one for stores, which is what
//! address translation actually uses.

use r4300_util::Bit;
use crate::bus::ram::Ram;
use crate::code_cache::{CodeCache, PAGE_COUNT};

pub const TLB_ENTRY_COUNT: usize = 32;

/// Page index of KSEG0 and the distance to KSEG1, used to find the direct mapped alias of a
/// physical page.
const KSEG0_PAGE: usize = 0x8_0000;
const KSEG1_OFFSET: usize = 0x2_0000;

/// One half of a TLB entry.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TlbPage {
    pub pfn: u32,
    pub cache: u8,
    pub dirty: bool,
    pub valid: bool,
    /// First virtual address.
    pub start: u32,
    /// Last virtual address.
    pub end: u32,
    /// Physical base address.
    pub phys: u64,
}

impl TlbPage {
    fn decode(lo: u32) -> Self {
        Self {
            pfn: lo.bit_range(6, 29),
            cache: lo.bit_range(3, 5) as u8,
            dirty: lo.bit(2),
            valid: lo.bit(1),
            ..Default::default()
        }
    }

    fn encode(&self, global: bool) -> u32 {
        self.pfn << 6
            | (self.cache as u32) << 3
            | (self.dirty as u32) << 2
            | (self.valid as u32) << 1
            | global as u32
    }

    /// If the half can be installed in the page tables. Ranges inside the direct mapped segments
    /// and physical addresses outside of the physical address space are never mapped.
    fn is_mappable(&self) -> bool {
        self.valid
            && self.start < self.end
            && !(self.start >= 0x8000_0000 && self.end < 0xc000_0000)
            && self.phys < 0x2000_0000
    }

    fn pages(&self) -> std::ops::RangeInclusive<usize> {
        (self.start >> 12) as usize..=(self.end >> 12) as usize
    }

    /// Physical page address of virtual page `page`.
    fn phys_page(&self, page: usize) -> u32 {
        (self.phys as u32).wrapping_add(((page << 12) as u32).wrapping_sub(self.start))
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TlbEntry {
    pub mask: u32,
    pub vpn2: u32,
    pub global: bool,
    pub asid: u8,
    pub even: TlbPage,
    pub odd: TlbPage,
}

impl TlbEntry {
    fn halves(&self) -> [&TlbPage; 2] {
        [&self.even, &self.odd]
    }
}

/// The four COP0 registers used to stage a TLB entry.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TlbStage {
    pub page_mask: u32,
    pub entry_hi: u32,
    pub entry_lo0: u32,
    pub entry_lo1: u32,
}

pub struct Tlb {
    entries: [TlbEntry; TLB_ENTRY_COUNT],
    /// Physical page for each virtual page that can be loaded from.
    lut_r: Box<[Option<u32>]>,
    /// Physical page for each virtual page that can be stored to.
    lut_w: Box<[Option<u32>]>,
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            entries: [TlbEntry::default(); TLB_ENTRY_COUNT],
            lut_r: vec![None; PAGE_COUNT].into_boxed_slice(),
            lut_w: vec![None; PAGE_COUNT].into_boxed_slice(),
        }
    }

    pub fn entry(&self, index: usize) -> &TlbEntry {
        &self.entries[index]
    }

    /// Translate a virtual address through the page tables.
    pub fn translate(&self, addr: u32, write: bool) -> Option<u32> {
        let lut = if write { &self.lut_w } else { &self.lut_r };
        lut[(addr >> 12) as usize].map(|page| page | (addr & 0xfff))
    }

    /// If any entry spans `addr`, valid or not. A miss in the page tables for such an address
    /// isn't a refill.
    pub fn covers(&self, addr: u32) -> bool {
        self.entries.iter().any(|entry| {
            entry.halves().iter().any(|half| (half.start..=half.end).contains(&addr))
        })
    }

    /// Read an entry back into staging form.
    pub fn read(&self, index: usize) -> TlbStage {
        let entry = &self.entries[index];
        TlbStage {
            page_mask: entry.mask << 13,
            entry_hi: entry.vpn2 << 13 | entry.asid as u32,
            entry_lo0: entry.even.encode(entry.global),
            entry_lo1: entry.odd.encode(entry.global),
        }
    }

    /// Find the first entry matching the VPN2 and ASID of `entry_hi`.
    pub fn probe(&self, entry_hi: u32) -> Option<usize> {
        let vpn2 = entry_hi.bit_range(13, 31);
        let asid = entry_hi.bit_range(0, 7) as u8;
        self.entries.iter().position(|entry| {
            (entry.vpn2 & !entry.mask) == (vpn2 & !entry.mask)
                && (entry.global || entry.asid == asid)
        })
    }

    /// Overwrite entry `index` with the staged fields, keeping the code cache coherent.
    pub fn write(
        &mut self,
        index: usize,
        stage: TlbStage,
        ram: &Ram,
        code: &mut CodeCache,
    ) {
        let old = self.entries[index];

        for half in old.halves() {
            if half.valid {
                self.retire_half(half, ram, code);
            }
        }

        self.unmap(&old);

        let global = stage.entry_lo0.bit(0) && stage.entry_lo1.bit(0);
        let mask = stage.page_mask.bit_range(13, 24);
        let vpn2 = stage.entry_hi.bit_range(13, 31);

        let mut entry = TlbEntry {
            mask,
            vpn2,
            global,
            asid: stage.entry_hi.bit_range(0, 7) as u8,
            even: TlbPage::decode(stage.entry_lo0),
            odd: TlbPage::decode(stage.entry_lo1),
        };

        let span = (mask << 12).wrapping_add(0xfff);

        entry.even.start = vpn2 << 13;
        entry.even.end = entry.even.start.wrapping_add(span);
        entry.even.phys = (entry.even.pfn as u64) << 12;

        entry.odd.start = entry.even.end.wrapping_add(1);
        entry.odd.end = entry.odd.start.wrapping_add(span);
        entry.odd.phys = (entry.odd.pfn as u64) << 12;

        debug!(
            "TLB write at index {index}: {:08x}-{:08x} => {:09x}, {:08x}-{:08x} => {:09x}",
            entry.even.start, entry.even.end, entry.even.phys,
            entry.odd.start, entry.odd.end, entry.odd.phys,
        );

        self.entries[index] = entry;
        self.map(&entry);

        for half in entry.halves() {
            if half.valid {
                self.revalidate_half(half, ram, code);
            }
        }
    }

    /// Invalidate the pages of a half about to be unmapped, remembering a checksum of each page
    /// that was still valid.
    fn retire_half(&self, half: &TlbPage, ram: &Ram, code: &mut CodeCache) {
        for page in half.pages() {
            let phys = self.lut_r[page];
            if !code.is_invalid(page) {
                if let Some(phys) = phys {
                    let alias = KSEG0_PAGE | (phys >> 12) as usize;
                    if code.is_invalid(alias) || code.is_invalid(alias + KSEG1_OFFSET) {
                        code.set_invalid(page, true);
                    }
                }
            }
            if !code.is_invalid(page) {
                let checksum = phys.map(|phys| ram.page_checksum(phys));
                code.set_checksum(page, checksum);
                code.set_invalid(page, true);
            } else if code.is_compiled(page) {
                code.set_checksum(page, None);
            }
        }
    }

    /// Mark pages valid again if their content is unchanged since they were retired.
    fn revalidate_half(&self, half: &TlbPage, ram: &Ram, code: &mut CodeCache) {
        for page in half.pages() {
            let (Some(checksum), Some(phys)) = (code.checksum(page), self.lut_r[page]) else {
                continue;
            };
            if checksum == ram.page_checksum(phys) {
                code.set_invalid(page, false);
            }
        }
    }

    fn map(&mut self, entry: &TlbEntry) {
        for half in entry.halves() {
            if !half.is_mappable() {
                continue;
            }
            for page in half.pages() {
                let phys = half.phys_page(page);
                self.lut_r[page] = Some(phys);
                if half.dirty {
                    self.lut_w[page] = Some(phys);
                }
            }
        }
    }

    fn unmap(&mut self, entry: &TlbEntry) {
        for half in entry.halves() {
            if !half.is_mappable() {
                continue;
            }
            for page in half.pages() {
                self.lut_r[page] = None;
                self.lut_w[page] = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Word;

    fn stage(entry_hi: u32, lo0: u32, lo1: u32) -> TlbStage {
        TlbStage { page_mask: 0, entry_hi, entry_lo0: lo0, entry_lo1: lo1 }
    }

    #[test]
    fn read_back_matches_staged() {
        let ram = Ram::new();
        let mut code = CodeCache::new();
        let mut tlb = Tlb::new();

        let staged = TlbStage {
            page_mask: 0x0000_6000,
            entry_hi: 0x1234_4012,
            entry_lo0: 0x0000_1f47,
            entry_lo1: 0x0012_3417,
        };
        tlb.write(5, staged, &ram, &mut code);
        assert_eq!(tlb.read(5), staged);
    }

    #[test]
    fn ranges_follow_page_mask() {
        let ram = Ram::new();
        let mut code = CodeCache::new();
        let mut tlb = Tlb::new();

        let staged = TlbStage {
            page_mask: 0x0000_6000,
            entry_hi: 0x0040_0000,
            entry_lo0: 0x0000_0106,
            entry_lo1: 0x0000_0206,
        };
        tlb.write(0, staged, &ram, &mut code);

        let entry = tlb.entry(0);
        assert_eq!(entry.even.start, 0x0040_0000);
        assert_eq!(entry.even.end, 0x0040_3fff);
        assert_eq!(entry.odd.start, entry.even.end + 1);
        assert_eq!(entry.odd.end, 0x0040_7fff);
        assert_eq!(entry.odd.phys, 0x8000);
    }

    #[test]
    fn translation_respects_dirty_bit() {
        let ram = Ram::new();
        let mut code = CodeCache::new();
        let mut tlb = Tlb::new();

        // Even page valid and dirty, odd page valid but clean.
        tlb.write(0, stage(0x0001_0000, 0x0000_0046, 0x0000_0082), &ram, &mut code);

        assert_eq!(tlb.translate(0x0001_0123, false), Some(0x1123));
        assert_eq!(tlb.translate(0x0001_0123, true), Some(0x1123));
        assert_eq!(tlb.translate(0x0001_1004, false), Some(0x2004));
        assert_eq!(tlb.translate(0x0001_1004, true), None);
        assert_eq!(tlb.translate(0x0001_2000, false), None);

        assert!(tlb.covers(0x0001_1fff));
        assert!(!tlb.covers(0x0001_2000));

        // Overwrite removes the old mapping.
        tlb.write(0, stage(0x0002_0000, 0x0000_0046, 0x0000_0000), &ram, &mut code);
        assert_eq!(tlb.translate(0x0001_0123, false), None);
        assert_eq!(tlb.translate(0x0002_0123, false), Some(0x1123));
    }

    #[test]
    fn probe_matches_asid_or_global() {
        let ram = Ram::new();
        let mut code = CodeCache::new();
        let mut tlb = Tlb::new();

        tlb.write(3, stage(0x0001_0007, 0x0000_0002, 0x0000_0002), &ram, &mut code);
        tlb.write(4, stage(0x0003_0000, 0x0000_0003, 0x0000_0003), &ram, &mut code);

        assert_eq!(tlb.probe(0x0001_0007), Some(3));
        assert_eq!(tlb.probe(0x0001_0008), None);
        assert_eq!(tlb.probe(0x0003_00ff), Some(4));
    }

    #[test]
    fn remap_onto_unchanged_content_stays_valid() {
        let mut ram = Ram::new();
        let mut code = CodeCache::new();
        let mut tlb = Tlb::new();

        tlb.write(0, stage(0x0001_0000, 0x0000_0042, 0), &ram, &mut code);
        code.mark_compiled(0x10);
        code.set_invalid(KSEG0_PAGE | 1, false);
        code.set_invalid((KSEG0_PAGE | 1) + KSEG1_OFFSET, false);

        // Unmap and map the same page again.
        tlb.write(0, stage(0x0001_0000, 0x0000_0042, 0), &ram, &mut code);
        assert!(!code.is_invalid(0x10));

        // Content changed while unmapped.
        tlb.write(0, stage(0x0001_0000, 0, 0), &ram, &mut code);
        assert!(code.is_invalid(0x10));
        ram.store::<Word>(0x1000, 0xdead_beef);
        tlb.write(0, stage(0x0001_0000, 0x0000_0042, 0), &ram, &mut code);
        assert!(code.is_invalid(0x10));
    }

    #[test]
    fn invalid_direct_alias_invalidates_page() {
        let ram = Ram::new();
        let mut code = CodeCache::new();
        let mut tlb = Tlb::new();

        tlb.write(0, stage(0x0001_0000, 0x0000_0042, 0), &ram, &mut code);
        code.mark_compiled(0x10);

        // The KSEG0 alias of physical page 1 is still invalid.
        assert!(code.is_invalid(KSEG0_PAGE | 1));
        tlb.write(0, stage(0x0001_0000, 0x0000_0042, 0), &ram, &mut code);
        assert!(code.is_invalid(0x10));
    }
}
