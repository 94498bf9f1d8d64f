//! 需求库 - 基础设施层
//!
//! 持有唯一的 SQLite 连接，只暴露"读写需求记录"的能力。
//!
//! 连接放在 `Arc<Mutex<_>>` 中，所有操作都在 `spawn_blocking` 里执行，
//! 同一阶段内多个 worker 并发写入时由互斥锁串行化。
//! 状态迁移的校验与写入在同一把锁内完成。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::{Requirement, RequirementDraft, RequirementStatus};

const SELECT_COLUMNS: &str = "req_id, feature_name, description, preconditions, user_actions, \
     expected_behavior, validation_handling, full_content, status, generated_code, \
     review_result, created_at";

/// 需求库
///
/// 职责：
/// - 每个 `req_id` 只有一条记录（按键 upsert）
/// - 状态只能按 `RequirementStatus::can_transition_to` 迁移
/// - 不关心轮次、不关心流程
#[derive(Clone)]
pub struct RequirementStore {
    conn: Arc<Mutex<Connection>>,
}

impl RequirementStore {
    /// 打开（或创建）数据库文件并初始化表结构
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self::from_connection(conn);
        store.init_schema()?;
        debug!("需求库已初始化: {}", path.display());
        Ok(store)
    }

    /// 创建内存数据库（测试和试运行使用）
    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self::from_connection(Connection::open_in_memory()?);
        store.init_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS requirements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    req_id TEXT UNIQUE NOT NULL,
                    feature_name TEXT,
                    description TEXT,
                    preconditions TEXT,
                    user_actions TEXT,
                    expected_behavior TEXT,
                    validation_handling TEXT,
                    full_content TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    generated_code TEXT,
                    review_result TEXT,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                );
                CREATE INDEX IF NOT EXISTS idx_requirements_status ON requirements(status);
                "#,
            )?;
            Ok(())
        })
    }

    /// 锁定连接；互斥锁中毒时连接本身仍然可用
    fn with_conn<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Connection) -> StoreResult<R>,
    {
        let guard = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// 在阻塞线程池中执行一次数据库操作
    async fn run<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// 按 `req_id` 写入需求内容
    ///
    /// 已存在的记录只覆盖内容字段，状态和产物保持不变。
    pub async fn upsert_requirement(&self, draft: &RequirementDraft) -> StoreResult<()> {
        let draft = draft.clone();
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO requirements (
                    req_id, feature_name, description, preconditions, user_actions,
                    expected_behavior, validation_handling, full_content
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(req_id) DO UPDATE SET
                    feature_name = excluded.feature_name,
                    description = excluded.description,
                    preconditions = excluded.preconditions,
                    user_actions = excluded.user_actions,
                    expected_behavior = excluded.expected_behavior,
                    validation_handling = excluded.validation_handling,
                    full_content = excluded.full_content
                "#,
                params![
                    draft.req_id,
                    draft.feature_name,
                    draft.description,
                    draft.preconditions,
                    draft.user_actions,
                    draft.expected_behavior,
                    draft.validation_handling,
                    draft.full_content,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// 按入库顺序返回全部需求
    pub async fn fetch_all(&self) -> StoreResult<Vec<Requirement>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM requirements ORDER BY id",
                SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map([], map_requirement_row)?;
            let requirements = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(requirements)
        })
        .await
    }

    pub async fn fetch_by_id(&self, req_id: &str) -> StoreResult<Option<Requirement>> {
        let req_id = req_id.to_string();
        self.run(move |conn| {
            let requirement = conn
                .query_row(
                    &format!("SELECT {} FROM requirements WHERE req_id = ?1", SELECT_COLUMNS),
                    params![req_id],
                    map_requirement_row,
                )
                .optional()?;
            Ok(requirement)
        })
        .await
    }

    /// 保存生成的代码，状态迁移到 `code_generated`
    pub async fn update_code(&self, req_id: &str, code: &str) -> StoreResult<()> {
        let req_id = req_id.to_string();
        let code = code.to_string();
        self.run(move |conn| {
            check_transition(conn, &req_id, RequirementStatus::CodeGenerated)?;
            conn.execute(
                "UPDATE requirements SET generated_code = ?1, status = ?2 WHERE req_id = ?3",
                params![code, RequirementStatus::CodeGenerated.as_str(), req_id],
            )?;
            Ok(())
        })
        .await
    }

    /// 保存评审文本和评审状态
    pub async fn update_review(
        &self,
        req_id: &str,
        review: &str,
        status: RequirementStatus,
    ) -> StoreResult<()> {
        let req_id = req_id.to_string();
        let review = review.to_string();
        self.run(move |conn| {
            check_transition(conn, &req_id, status)?;
            conn.execute(
                "UPDATE requirements SET review_result = ?1, status = ?2 WHERE req_id = ?3",
                params![review, status.as_str(), req_id],
            )?;
            Ok(())
        })
        .await
    }

    /// 模型调用失败时记录 `error` 状态，失败原因写入 `review_result`
    pub async fn mark_error(&self, req_id: &str, reason: &str) -> StoreResult<()> {
        self.update_review(req_id, reason, RequirementStatus::Error)
            .await
    }

    /// 返回所有已通过评审的 `(req_id, generated_code)`，按入库顺序
    pub async fn fetch_approved(&self) -> StoreResult<Vec<(String, String)>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT req_id, generated_code FROM requirements \
                 WHERE status = ?1 AND generated_code IS NOT NULL ORDER BY id",
            )?;
            let rows = stmt.query_map(params![RequirementStatus::Approved.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let approved = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(approved)
        })
        .await
    }

    pub async fn count(&self) -> StoreResult<usize> {
        self.run(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM requirements", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

/// 读取当前状态并校验迁移是否合法
fn check_transition(conn: &Connection, req_id: &str, next: RequirementStatus) -> StoreResult<()> {
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM requirements WHERE req_id = ?1",
            params![req_id],
            |row| row.get(0),
        )
        .optional()?;

    let current: RequirementStatus = current
        .ok_or_else(|| StoreError::NotFound(req_id.to_string()))?
        .parse()?;

    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            req_id: req_id.to_string(),
            from: current,
            to: next,
        })
    }
}

fn map_requirement_row(row: &Row<'_>) -> rusqlite::Result<Requirement> {
    let status: String = row.get(8)?;
    let status = status
        .parse::<RequirementStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Requirement {
        req_id: row.get(0)?,
        feature_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        preconditions: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        user_actions: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        expected_behavior: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        validation_handling: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        full_content: row.get(7)?,
        status,
        generated_code: row.get(9)?,
        review_result: row.get(10)?,
        created_at: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
    })
}
