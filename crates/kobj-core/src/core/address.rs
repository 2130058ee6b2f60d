use super::macros::impl_address;

impl_address!(Va, "virtual address inside an address space");
impl_address!(Pa, "physical address, used as a page-table root");
