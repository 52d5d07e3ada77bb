use super::OneBotConnection;
use crate::event::{Event, EventView};
use crate::fetcher::{GroupInfo, InfoFetcher, MemberInfo, SelfInfo, StrangerInfo};
use crate::warn;
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use simd_json::OwnedValue;
use simd_json::derived::ValueObjectAccess;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// API 默认超时
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

static ECHO_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_echo() -> String {
    let count = ECHO_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("api-req-{}", count)
}

#[derive(Serialize)]
struct ApiRequest<'a, T> {
    action: &'a str,
    params: T,
    echo: String,
}

/// 通用 API 调用函数
pub async fn call_action<P, R>(
    conn: &OneBotConnection,
    action: &str,
    params: P,
    timeout: Duration,
) -> Result<R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    let echo = next_echo();
    let req = ApiRequest {
        action,
        params,
        echo: echo.clone(),
    };
    let json_str = simd_json::to_string(&req)?;

    // 先注册监听再发送，避免响应先于注册到达
    let waiter = conn.matcher().register(echo.clone()).await;

    if let Err(e) = conn.send_frame(json_str).await {
        conn.matcher().cancel(&echo).await;
        return Err(e);
    }

    let resp = match tokio::time::timeout(timeout, waiter).await {
        Ok(Ok(resp)) => resp,
        _ => {
            conn.matcher().cancel(&echo).await;
            bail!("API 请求超时: {}", action);
        }
    };

    parse_response(resp)
}

/// 响应格式: { status, retcode, data, echo }
fn parse_response<R: DeserializeOwned>(resp: Event) -> Result<R> {
    let retcode = EventView(&resp).id("retcode").unwrap_or(-1);
    if retcode != 0 {
        let msg = EventView(&resp)
            .str("message")
            .or_else(|| EventView(&resp).str("msg"))
            .or_else(|| EventView(&resp).str("wording"))
            .unwrap_or("Unknown Error");
        return Err(anyhow!("API 调用失败 (retcode={}): {}", retcode, msg));
    }

    let data = resp.get("data").cloned().unwrap_or(OwnedValue::from(()));
    Ok(simd_json::serde::from_owned_value(data)?)
}

// ================= API 定义 =================

#[derive(Serialize)]
struct GroupParams {
    group_id: i64,
}

#[derive(Serialize)]
struct MemberParams {
    group_id: i64,
    user_id: i64,
    no_cache: bool,
}

#[derive(Serialize)]
struct UserParams {
    user_id: i64,
}

#[derive(Serialize)]
struct NoParams {}

/// 通过 NapCat API 查询身份信息，失败时记录警告并返回 None
pub struct OneBotFetcher {
    conn: OneBotConnection,
    timeout: Duration,
}

impl OneBotFetcher {
    pub fn new(conn: OneBotConnection) -> Self {
        Self {
            conn,
            timeout: API_TIMEOUT,
        }
    }

    async fn query<P, R>(&self, action: &str, params: P) -> Option<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        match call_action(&self.conn, action, params, self.timeout).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(target: "OneBot", "{} 调用失败: {:#}", action, e);
                None
            }
        }
    }
}

#[async_trait]
impl InfoFetcher for OneBotFetcher {
    async fn group_info(&self, group_id: i64) -> Option<GroupInfo> {
        self.query("get_group_info", GroupParams { group_id }).await
    }

    async fn member_info(&self, group_id: i64, user_id: i64) -> Option<MemberInfo> {
        let params = MemberParams {
            group_id,
            user_id,
            no_cache: true,
        };
        self.query("get_group_member_info", params).await
    }

    async fn member_list(&self, group_id: i64) -> Option<Vec<MemberInfo>> {
        self.query("get_group_member_list", GroupParams { group_id })
            .await
    }

    async fn self_info(&self) -> Option<SelfInfo> {
        self.query("get_login_info", NoParams {}).await
    }

    async fn stranger_info(&self, user_id: i64) -> Option<StrangerInfo> {
        self.query("get_stranger_info", UserParams { user_id }).await
    }
}
