//! 基于 `event_listener` 和自旋锁的睡眠锁。
//!
//! 持有者可以跨越挂起点，等待者让出执行而不是自旋

use core::{
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

use event_listener::{listener, Event};
use spin::mutex::SpinMutexGuard;

pub struct SleepMutex<T: ?Sized> {
    lock_ops: Event,
    base: spin::mutex::SpinMutex<T>,
}

pub struct SleepMutexGuard<'a, T: ?Sized> {
    spin_guard: ManuallyDrop<SpinMutexGuard<'a, T>>,
    mutex: &'a SleepMutex<T>,
    // 不允许 Guard 越过 .await
    _not_send: PhantomData<*mut ()>,
}

unsafe impl<T: ?Sized + Send> Send for SleepMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for SleepMutex<T> {}

unsafe impl<T: ?Sized + Sync> Sync for SleepMutexGuard<'_, T> {}

impl<T> SleepMutex<T> {
    #[inline(always)]
    pub const fn new(data: T) -> Self {
        SleepMutex {
            lock_ops: Event::new(),
            base: spin::mutex::SpinMutex::new(data),
        }
    }

    #[inline(always)]
    pub fn into_inner(self) -> T {
        self.base.into_inner()
    }
}

impl<T: ?Sized> SleepMutex<T> {
    #[inline]
    pub async fn lock(&self) -> SleepMutexGuard<'_, T> {
        if let Some(guard) = self.try_lock() {
            return guard;
        }
        self.acquire_slow().await
    }

    #[cold]
    async fn acquire_slow(&self) -> SleepMutexGuard<'_, T> {
        loop {
            listener!(self.lock_ops => listener);
            // 在这中间有可能锁被释放了
            // 因此建立起监听之后要重新试着拿一下锁
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            listener.await;
            // 被唤醒之后试着拿锁（有可能被别人抢先）
            if let Some(guard) = self.try_lock() {
                return guard;
            }
        }
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.base.is_locked()
    }

    #[inline(always)]
    pub fn try_lock(&self) -> Option<SleepMutexGuard<'_, T>> {
        self.base.try_lock().map(|spin_guard| SleepMutexGuard {
            spin_guard: ManuallyDrop::new(spin_guard),
            mutex: self,
            _not_send: PhantomData,
        })
    }

    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        self.base.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for SleepMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => write!(f, "Mutex {{ data: ")
                .and_then(|()| (*guard).fmt(f))
                .and_then(|()| write!(f, "}}")),
            None => write!(f, "Mutex {{ <locked> }}"),
        }
    }
}

impl<'a, T: ?Sized> Deref for SleepMutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.spin_guard
    }
}

impl<'a, T: ?Sized> DerefMut for SleepMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.spin_guard
    }
}

impl<'a, T: ?Sized> Drop for SleepMutexGuard<'a, T> {
    fn drop(&mut self) {
        // SAFETY: 只会在这里 drop，而且之后再也不会被用到
        unsafe {
            ManuallyDrop::drop(&mut self.spin_guard);
        }
        self.mutex.lock_ops.notify(1);
    }
}
