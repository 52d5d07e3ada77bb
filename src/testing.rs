//! 测试用的内存实现

use crate::access::AccessGate;
use crate::ban::BanRecord;
use crate::ban::loader::BanLoader;
use crate::ban::store::BanStore;
use crate::delivery::EnvelopeSender;
use crate::envelope::{Envelope, EnvelopeBuilder, EnvelopeKind, Seg, UserInfo};
use crate::fetcher::{GroupInfo, InfoFetcher, MemberInfo, SelfInfo, StrangerInfo};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// ================== BanStore ==================

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<BanRecord>>,
}

impl MemoryStore {
    pub fn seed(&self, records: &[BanRecord]) {
        self.records.lock().unwrap().extend_from_slice(records);
    }

    pub fn records(&self) -> Vec<BanRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl BanStore for MemoryStore {
    async fn create_ban_record(&self, record: &BanRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.same_identity(record)) {
            Some(existing) => *existing = *record,
            None => records.push(*record),
        }
        Ok(())
    }

    async fn delete_ban_record(&self, record: &BanRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .retain(|r| !r.same_identity(record));
        Ok(())
    }

    async fn list_ban_records(&self) -> Result<Vec<BanRecord>> {
        Ok(self.records())
    }
}

// ================== BanLoader ==================

pub struct StaticLoader {
    active: Vec<BanRecord>,
    lifted: Vec<BanRecord>,
    fail: bool,
}

impl StaticLoader {
    pub fn new(active: Vec<BanRecord>, lifted: Vec<BanRecord>) -> Self {
        Self {
            active,
            lifted,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            active: Vec::new(),
            lifted: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl BanLoader for StaticLoader {
    async fn load_persisted_bans(&self) -> Result<(Vec<BanRecord>, Vec<BanRecord>)> {
        if self.fail {
            bail!("database is locked");
        }
        Ok((self.active.clone(), self.lifted.clone()))
    }
}

// ================== InfoFetcher ==================

#[derive(Default)]
pub struct FakeFetcher {
    pub members: HashMap<(i64, i64), MemberInfo>,
    pub groups: HashMap<i64, GroupInfo>,
    pub strangers: HashMap<i64, StrangerInfo>,
    pub self_info: Option<SelfInfo>,
}

impl FakeFetcher {
    pub fn member(mut self, group_id: i64, user_id: i64, nickname: &str) -> Self {
        self.members.insert(
            (group_id, user_id),
            MemberInfo {
                user_id,
                nickname: Some(nickname.to_string()),
                ..Default::default()
            },
        );
        self
    }

    pub fn group(mut self, group_id: i64, name: &str) -> Self {
        self.groups.insert(
            group_id,
            GroupInfo {
                group_id,
                group_name: Some(name.to_string()),
                group_all_shut: None,
            },
        );
        self
    }

    pub fn stranger(mut self, user_id: i64, nickname: &str) -> Self {
        self.strangers.insert(
            user_id,
            StrangerInfo {
                user_id,
                nickname: Some(nickname.to_string()),
            },
        );
        self
    }

    pub fn login(mut self, user_id: i64, nickname: &str) -> Self {
        self.self_info = Some(SelfInfo {
            user_id,
            nickname: nickname.to_string(),
        });
        self
    }
}

#[async_trait]
impl InfoFetcher for FakeFetcher {
    async fn group_info(&self, group_id: i64) -> Option<GroupInfo> {
        self.groups.get(&group_id).cloned()
    }

    async fn member_info(&self, group_id: i64, user_id: i64) -> Option<MemberInfo> {
        self.members.get(&(group_id, user_id)).cloned()
    }

    async fn member_list(&self, group_id: i64) -> Option<Vec<MemberInfo>> {
        let list: Vec<MemberInfo> = self
            .members
            .iter()
            .filter(|((g, _), _)| *g == group_id)
            .map(|(_, m)| m.clone())
            .collect();
        if list.is_empty() { None } else { Some(list) }
    }

    async fn self_info(&self) -> Option<SelfInfo> {
        self.self_info.clone()
    }

    async fn stranger_info(&self, user_id: i64) -> Option<StrangerInfo> {
        self.strangers.get(&user_id).cloned()
    }
}

// ================== AccessGate ==================

pub struct FixedGate(AtomicBool);

impl FixedGate {
    pub fn allow() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn deny() -> Self {
        Self(AtomicBool::new(false))
    }
}

#[async_trait]
impl AccessGate for FixedGate {
    async fn check_allowed_to_chat(
        &self,
        _user_id: i64,
        _group_id: Option<i64>,
        _is_group_event: bool,
        _is_command: bool,
    ) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ================== EnvelopeSender ==================

#[derive(Default)]
struct SenderState {
    fail_next: usize,
    panic_next: usize,
    attempted: Vec<Envelope>,
    delivered: Vec<Envelope>,
}

/// 记录所有发送尝试，可预设失败或 panic 次数
#[derive(Default)]
pub struct RecordingSender {
    state: Mutex<SenderState>,
}

impl RecordingSender {
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn panic_next(&self, n: usize) {
        self.state.lock().unwrap().panic_next = n;
    }

    pub fn attempted_texts(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .attempted
            .iter()
            .map(|e| e.message_segment.plain_text())
            .collect()
    }

    pub fn delivered_texts(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .delivered
            .iter()
            .map(|e| e.message_segment.plain_text())
            .collect()
    }

    pub fn delivered(&self) -> Vec<Envelope> {
        self.state.lock().unwrap().delivered.clone()
    }
}

#[async_trait]
impl EnvelopeSender for RecordingSender {
    async fn send(&self, envelope: &Envelope) -> Result<bool> {
        let should_panic = {
            let mut state = self.state.lock().unwrap();
            state.attempted.push(envelope.clone());
            if state.panic_next > 0 {
                state.panic_next -= 1;
                true
            } else if state.fail_next > 0 {
                state.fail_next -= 1;
                return Ok(false);
            } else {
                state.delivered.push(envelope.clone());
                false
            }
        };

        if should_panic {
            panic!("sender exploded");
        }
        Ok(true)
    }
}

/// 仅含一段文本的通知
pub fn envelope_with_text(text: &str) -> Envelope {
    EnvelopeBuilder::new("qq", EnvelopeKind::Notice, 0.0)
        .user(UserInfo::new("qq", 1, "tester"))
        .segment(Seg::text(text))
        .build()
        .unwrap()
}
