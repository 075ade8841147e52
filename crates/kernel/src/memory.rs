//! 进程的用户地址空间。
//!
//! 只维护按页分配的稀疏映射，足以支撑信号现场的压栈、
//! 参数结构的整体拷入拷出和用户锁字的读取。
//! 访问未映射区域一律返回 `EFAULT`，由调用方决定如何升级

use alloc::boxed::Box;

use bytemuck::Pod;
use defines::error::{errno, KResult};
use hashbrown::HashMap;

pub const PAGE_SIZE: usize = 4096;

#[derive(Clone)]
pub struct MemorySpace {
    pages: HashMap<usize, Box<[u8; PAGE_SIZE]>>,
}

impl MemorySpace {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    /// 映射 `[start, start + len)` 覆盖到的所有页，内容清零。
    ///
    /// 重复映射已有的页会保留原内容
    pub fn map_region(&mut self, start: usize, len: usize) {
        let end = start.saturating_add(len);
        let mut page = start & !(PAGE_SIZE - 1);
        while page < end {
            self.pages
                .entry(page)
                .or_insert_with(|| Box::new([0; PAGE_SIZE]));
            page += PAGE_SIZE;
        }
    }

    pub fn unmap_region(&mut self, start: usize, len: usize) {
        let end = start.saturating_add(len);
        let mut page = start & !(PAGE_SIZE - 1);
        while page < end {
            self.pages.remove(&page);
            page += PAGE_SIZE;
        }
    }

    pub fn copy_from_user(&self, addr: usize, buf: &mut [u8]) -> KResult<()> {
        let mut addr = addr;
        let mut copied = 0;
        while copied < buf.len() {
            let page = addr & !(PAGE_SIZE - 1);
            let offset = addr - page;
            let n = (PAGE_SIZE - offset).min(buf.len() - copied);
            let Some(data) = self.pages.get(&page) else {
                return Err(errno::EFAULT);
            };
            buf[copied..copied + n].copy_from_slice(&data[offset..offset + n]);
            copied += n;
            addr += n;
        }
        Ok(())
    }

    pub fn copy_to_user(&mut self, addr: usize, data: &[u8]) -> KResult<()> {
        let mut addr = addr;
        let mut copied = 0;
        while copied < data.len() {
            let page = addr & !(PAGE_SIZE - 1);
            let offset = addr - page;
            let n = (PAGE_SIZE - offset).min(data.len() - copied);
            let Some(target) = self.pages.get_mut(&page) else {
                return Err(errno::EFAULT);
            };
            target[offset..offset + n].copy_from_slice(&data[copied..copied + n]);
            copied += n;
            addr += n;
        }
        Ok(())
    }

    /// 从用户空间整体读入一个 Pod 结构
    pub fn read_obj<T: Pod>(&self, addr: usize) -> KResult<T> {
        let mut value = T::zeroed();
        self.copy_from_user(addr, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn write_obj<T: Pod>(&mut self, addr: usize, value: &T) -> KResult<()> {
        self.copy_to_user(addr, bytemuck::bytes_of(value))
    }
}

impl Default for MemorySpace {
    fn default() -> Self {
        Self::new()
    }
}
