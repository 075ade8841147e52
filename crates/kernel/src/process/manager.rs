//! 全局进程表和 id 分配器

use alloc::{collections::BTreeMap, vec::Vec};

use klocks::SpinMutex;
use triomphe::Arc;

use crate::process::Process;

/// 可回收的 id 分配器，pid 和 tid 都用它
pub struct RecycleAllocator {
    current: usize,
    recycled: Vec<usize>,
}

impl RecycleAllocator {
    pub const fn new() -> Self {
        Self::begin_with(0)
    }

    pub const fn begin_with(begin: usize) -> Self {
        Self {
            current: begin,
            recycled: Vec::new(),
        }
    }

    pub fn alloc(&mut self) -> usize {
        if let Some(id) = self.recycled.pop() {
            id
        } else {
            self.current += 1;
            self.current - 1
        }
    }

    pub fn dealloc(&mut self, id: usize) {
        debug_assert!(id < self.current);
        debug_assert!(!self.recycled.contains(&id));
        self.recycled.push(id);
    }
}

impl Default for RecycleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

pub static PROCESS_TABLE: ProcessTable = ProcessTable::new();

/// 以 pid 索引所有存活（含僵尸）进程。
///
/// 进程退出后仍保留在表中，直到被父进程回收；
/// 没有父进程的进程退出时直接移除
pub struct ProcessTable {
    inner: SpinMutex<TableInner>,
}

struct TableInner {
    map: BTreeMap<usize, Arc<Process>>,
    // pid 0 保留
    pid_allocator: RecycleAllocator,
}

impl ProcessTable {
    const fn new() -> Self {
        Self {
            inner: SpinMutex::new(TableInner {
                map: BTreeMap::new(),
                pid_allocator: RecycleAllocator::begin_with(1),
            }),
        }
    }

    pub(super) fn alloc_pid(&self) -> usize {
        self.inner.lock().pid_allocator.alloc()
    }

    pub(super) fn register(&self, process: &Arc<Process>) {
        let mut inner = self.inner.lock();
        let old = inner.map.insert(process.pid(), Arc::clone(process));
        debug_assert!(old.is_none());
    }

    /// 把进程从表中移除。pid 要等 `Process` 本体析构时才回收
    pub fn remove(&self, pid: usize) -> Option<Arc<Process>> {
        self.inner.lock().map.remove(&pid)
    }

    pub(super) fn release_pid(&self, pid: usize) {
        self.inner.lock().pid_allocator.dealloc(pid);
    }

    pub fn get(&self, pid: usize) -> Option<Arc<Process>> {
        self.inner.lock().map.get(&pid).cloned()
    }

    pub fn contains(&self, pid: usize) -> bool {
        self.inner.lock().map.contains_key(&pid)
    }

    /// 当前表中所有进程的快照
    pub fn processes(&self) -> Vec<Arc<Process>> {
        self.inner.lock().map.values().cloned().collect()
    }
}
