//! Virtual-memory surface of the process/IPC core: the external contract
//! (`PhysicalMemory`, `AddressSpace`), a host-memory reference backend, and
//! the page-fault resolution policy built against that contract.

pub mod contract;
pub mod pgfault;
pub mod sim;
