use std::sync::LazyLock;

pub mod abi;
pub mod syscall;

pub static PAGE_SIZE: LazyLock<usize> = LazyLock::new(|| {
    let name = libc::_SC_PAGE_SIZE;
    let size = unsafe { libc::sysconf(name) };
    size as _
});

pub use abi::{Attr, Header, Metadata};
