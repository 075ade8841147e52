use alloc::collections::VecDeque;

use defines::signal::SigInfo;

use crate::{SigCode, SigInfoExt, Signal, SignalSet};

/// 信号记录出队（或被丢弃）后需要执行的收尾动作。
///
/// 记录本身被队列所有，因此收尾动作只携带普通数据，
/// 由内核在队列锁之外解析执行
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// 无事可做，记录随队列释放
    Free,
    /// 子进程事件记录：最终回收该子进程
    ChildReap { child_pid: usize },
    /// 定时器到期记录：出队时结算 overflow 并可能重新入队
    TimerRearm { timer_id: usize },
    /// 嵌入在别的对象中的记录，不得释放
    None,
}

/// 排队中的一个信号实例
#[derive(Clone, Debug)]
pub struct SignalRecord {
    pub info: SigInfo,
    pub completion: Completion,
}

impl SignalRecord {
    pub fn new(info: SigInfo) -> Self {
        Self {
            info,
            completion: Completion::Free,
        }
    }

    pub fn with_completion(info: SigInfo, completion: Completion) -> Self {
        Self { info, completion }
    }

    pub fn signal(&self) -> Option<Signal> {
        self.info.signal()
    }
}

/// 信号记录队列。线程和进程各有一个。
///
/// 记录由队列拥有，入队即移交所有权，因此一条记录不可能同时
/// 出现在两个队列上。队列内记录保持入队顺序，同一信号的多条
/// 记录按 FIFO 交付
#[derive(Debug, Default)]
pub struct SignalQueue {
    records: VecDeque<SignalRecord>,
}

impl SignalQueue {
    pub const fn new() -> Self {
        Self {
            records: VecDeque::new(),
        }
    }

    pub fn push(&mut self, record: SignalRecord) {
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 取走指定信号的第一条记录。
    ///
    /// 第二个返回值表示队列里是否还有同一信号的记录，
    /// 调用者据此决定要不要清掉待决位
    pub fn pop_signal(&mut self, signal: Signal) -> (Option<SignalRecord>, bool) {
        let mut found = None;
        let mut more = false;
        for (i, record) in self.records.iter().enumerate() {
            if record.signal() == Some(signal) {
                if found.is_none() {
                    found = Some(i);
                } else {
                    more = true;
                    break;
                }
            }
        }
        (found.and_then(|i| self.records.remove(i)), more)
    }

    /// 丢弃指定信号的全部记录，返回它们以便执行收尾动作
    pub fn drain_signal(&mut self, signal: Signal) -> VecDeque<SignalRecord> {
        let mut drained = VecDeque::new();
        let mut i = 0;
        while i < self.records.len() {
            if self.records[i].signal() == Some(signal) {
                if let Some(record) = self.records.remove(i) {
                    drained.push_back(record);
                }
            } else {
                i += 1;
            }
        }
        drained
    }

    /// 取走指定子进程的事件记录（用于合并同一子进程的连续事件）
    pub fn take_child_record(&mut self, child_pid: usize) -> Option<SignalRecord> {
        let i = self.records.iter().position(|record| {
            record.info.sender_pid == child_pid
                && record.info.sig_code().is_some_and(SigCode::is_child_event)
        })?;
        self.records.remove(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalRecord> {
        self.records.iter()
    }

    pub fn remove(&mut self, index: usize) -> Option<SignalRecord> {
        self.records.remove(index)
    }

    /// 队列中所有记录构成的信号集
    pub fn pending_set(&self) -> SignalSet {
        let mut set = SignalSet::empty();
        for record in &self.records {
            if let Some(signal) = record.signal() {
                set.insert(signal.into());
            }
        }
        set
    }
}
