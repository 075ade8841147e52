//! 用户态锁字的等待与唤醒。
//!
//! 键是（pid，虚拟地址），纯进程私有。等待者在读取锁字前就挂上
//! 队列锁，读出的值与期望不符立即返回 `EAGAIN`；唤醒方先把等待者
//! 从队列摘下再通知，被摘下的等待者即使同时超时或被打断也算被
//! 唤醒成功

use alloc::collections::{BTreeMap, VecDeque};

use defines::error::{errno, KResult};
use event_listener::Event;
use klocks::{Lazy, SleepMutex};
use smallvec::SmallVec;
use triomphe::Arc;

use crate::{
    executor::{self, WaitOutcome},
    thread::Thread,
};

static USER_LOCKS: Lazy<UserLockTable> = Lazy::new(|| UserLockTable {
    tree: SleepMutex::new(BTreeMap::new()),
});

struct UserLockTable {
    tree: SleepMutex<BTreeMap<(usize, usize), VecDeque<Arc<Waiter>>>>,
}

struct Waiter {
    event: Event,
    woken: core::sync::atomic::AtomicBool,
}

impl Waiter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            event: Event::new(),
            woken: core::sync::atomic::AtomicBool::new(false),
        })
    }

    fn is_woken(&self) -> bool {
        self.woken.load(core::sync::atomic::Ordering::SeqCst)
    }
}

/// 锁字仍等于 `expected` 时睡去，直到被唤醒、超时或被信号打断。
///
/// 被打断时返回 `RESTART`，剩余超时的写回由系统调用层负责
pub async fn wait(
    thread: &Arc<Thread>,
    address: usize,
    expected: u32,
    timeout_ms: Option<usize>,
) -> KResult<()> {
    if address % 4 != 0 {
        return Err(errno::EINVAL);
    }
    let process = &thread.process;
    let key = (process.pid(), address);
    let waiter = Waiter::new();
    {
        let mut tree = USER_LOCKS.tree.lock().await;
        // 在队列锁内读值，和唤醒方的先摘后通知配对
        let current: u32 = process.read_user(address)?;
        if current != expected {
            return Err(errno::EAGAIN);
        }
        tree.entry(key).or_default().push_back(Arc::clone(&waiter));
    }

    let mut listener = waiter.event.listen();
    loop {
        match executor::wait_interruptible_timeout(thread, listener, timeout_ms).await {
            WaitOutcome::Woken => {
                if waiter.is_woken() {
                    return Ok(());
                }
                // 伪唤醒，重新监听
                listener = waiter.event.listen();
                if waiter.is_woken() {
                    return Ok(());
                }
            }
            WaitOutcome::TimedOut => {
                remove_waiter(key, &waiter).await;
                return if waiter.is_woken() {
                    Ok(())
                } else {
                    Err(errno::ETIMEDOUT)
                };
            }
            WaitOutcome::Interrupted => {
                remove_waiter(key, &waiter).await;
                return if waiter.is_woken() {
                    Ok(())
                } else {
                    Err(errno::RESTART)
                };
            }
        }
    }
}

/// 唤醒至多 `max_count` 个等待者，返回实际唤醒的数量
pub async fn wake(process_pid: usize, address: usize, max_count: usize) -> KResult<usize> {
    if address % 4 != 0 {
        return Err(errno::EINVAL);
    }
    let mut woken: SmallVec<[Arc<Waiter>; 4]> = SmallVec::new();
    {
        let mut tree = USER_LOCKS.tree.lock().await;
        if let Some(queue) = tree.get_mut(&(process_pid, address)) {
            while woken.len() < max_count {
                let Some(waiter) = queue.pop_front() else {
                    break;
                };
                waiter
                    .woken
                    .store(true, core::sync::atomic::Ordering::SeqCst);
                woken.push(waiter);
            }
            if queue.is_empty() {
                tree.remove(&(process_pid, address));
            }
        }
    }
    for waiter in &woken {
        waiter.event.notify(usize::MAX);
    }
    Ok(woken.len())
}

async fn remove_waiter(key: (usize, usize), waiter: &Arc<Waiter>) {
    let mut tree = USER_LOCKS.tree.lock().await;
    if let Some(queue) = tree.get_mut(&key) {
        queue.retain(|other| !Arc::ptr_eq(other, waiter));
        if queue.is_empty() {
            tree.remove(&key);
        }
    }
}
