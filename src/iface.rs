use std::{collections::HashMap, ffi::CStr, io};

/// Resolve interface indices to interface names.
pub trait InterfaceNames: Send + Sync {
    /// Name of the interface with index `index`.
    fn name(&self, index: u32) -> io::Result<String>;
}

/// Looks names up in the running system with `if_indextoname(3)`.
///
/// Nothing is cached, so renamed and hot-plugged interfaces show up
/// under their current name.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInterfaces;

impl InterfaceNames for SystemInterfaces {
    fn name(&self, index: u32) -> io::Result<String> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
        let ptr = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
        if ptr.is_null() {
            return Err(io::Error::last_os_error());
        }
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }
}

impl InterfaceNames for HashMap<u32, String> {
    fn name(&self, index: u32) -> io::Result<String> {
        self.get(&index).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no interface with index {index}"),
            )
        })
    }
}
