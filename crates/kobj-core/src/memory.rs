//! A sparse in-memory address space.
//!
//! [`SparseMemory`] holds a handful of pages per page-table root and is
//! meant for exercising the overlay engine without a real memory image:
//! snippets carved out of a dump, unit tests, and demos. It performs no
//! page-table walking; every root simply owns its own page map, and pages
//! registered under the kernel root are visible from every derived space.

use std::{
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

use crate::{AddressSpace, KobjError, Pa, Va};

const PAGE_SIZE: u64 = 0x1000;
const PAGE_MASK: u64 = !(PAGE_SIZE - 1);

type PageMap = BTreeMap<u64, Box<[u8]>>;

/// The root under which kernel pages are registered.
pub const KERNEL_ROOT: Pa = Pa(0);

struct Image {
    spaces: HashMap<Pa, PageMap>,
}

impl Image {
    fn page(&self, root: Pa, va: Va) -> Option<&[u8]> {
        let page = va.0 & PAGE_MASK;

        if let Some(data) = self.spaces.get(&root).and_then(|pages| pages.get(&page)) {
            return Some(&data[..]);
        }

        if root != KERNEL_ROOT {
            return self
                .spaces
                .get(&KERNEL_ROOT)
                .and_then(|pages| pages.get(&page))
                .map(|data| &data[..]);
        }

        None
    }
}

/// A sparse, page-granular, read-only address space.
#[derive(Clone)]
pub struct SparseMemory {
    image: Rc<Image>,
    root: Pa,
}

impl SparseMemory {
    /// Returns a builder for a new memory image.
    pub fn builder() -> SparseMemoryBuilder {
        SparseMemoryBuilder::default()
    }

    /// Returns the page-table root this space translates through.
    pub fn root(&self) -> Pa {
        self.root
    }
}

impl AddressSpace for SparseMemory {
    fn read(&self, va: Va, buffer: &mut [u8]) -> Result<(), KobjError> {
        let mut position = 0usize;
        let mut remaining = buffer.len();

        while remaining > 0 {
            let address = va + position as u64;
            let page = match self.image.page(self.root, address) {
                Some(page) => page,
                None => return Err(KobjError::PageFault(address)),
            };

            let offset = (address.0 & !PAGE_MASK) as usize;
            let page = &page[offset..];

            let size = std::cmp::min(remaining, page.len());
            buffer[position..position + size].copy_from_slice(&page[..size]);

            position += size;
            remaining -= size;
        }

        Ok(())
    }

    fn is_valid_address(&self, va: Va) -> bool {
        self.image.page(self.root, va).is_some()
    }

    fn derive(&self, root: Pa) -> Result<Self, KobjError> {
        if !self.image.spaces.contains_key(&root) {
            return Err(KobjError::RootNotPresent(root));
        }

        Ok(Self {
            image: Rc::clone(&self.image),
            root,
        })
    }

    fn name(&self) -> String {
        if self.root == KERNEL_ROOT {
            String::from("kernel")
        }
        else {
            format!("root {:?}", self.root)
        }
    }
}

/// A builder for [`SparseMemory`].
#[derive(Default)]
pub struct SparseMemoryBuilder {
    spaces: HashMap<Pa, PageMap>,
}

impl SparseMemoryBuilder {
    /// Writes bytes into the kernel space, mapping pages as needed.
    pub fn write(self, va: Va, data: &[u8]) -> Self {
        self.write_in(KERNEL_ROOT, va, data)
    }

    /// Writes bytes into the space of the given root, mapping pages as
    /// needed.
    pub fn write_in(mut self, root: Pa, va: Va, data: &[u8]) -> Self {
        let pages = self.spaces.entry(root).or_default();

        for (index, byte) in data.iter().enumerate() {
            let address = va.0.wrapping_add(index as u64);
            let page = pages
                .entry(address & PAGE_MASK)
                .or_insert_with(|| vec![0u8; PAGE_SIZE as usize].into_boxed_slice());

            page[(address & !PAGE_MASK) as usize] = *byte;
        }

        self
    }

    /// Maps a zero-filled page without writing to it.
    pub fn map(mut self, root: Pa, va: Va) -> Self {
        self.spaces
            .entry(root)
            .or_default()
            .entry(va.0 & PAGE_MASK)
            .or_insert_with(|| vec![0u8; PAGE_SIZE as usize].into_boxed_slice());

        self
    }

    /// Registers an (initially empty) space for a root, so that
    /// [`AddressSpace::derive`] succeeds for it.
    pub fn root(mut self, root: Pa) -> Self {
        self.spaces.entry(root).or_default();
        self
    }

    /// Finishes the image and returns its kernel space.
    pub fn build(mut self) -> SparseMemory {
        self.spaces.entry(KERNEL_ROOT).or_default();

        SparseMemory {
            image: Rc::new(Image {
                spaces: self.spaces,
            }),
            root: KERNEL_ROOT,
        }
    }
}
