/// A live process as seen by the enumerator: just enough to match it
/// against the backend family and decide whether it's excludable from a
/// kill pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub exe_name: String,
}
