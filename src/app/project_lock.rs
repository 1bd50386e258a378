// ==========================================
// 志愿者配对系统 - 项目级写锁
// ==========================================
// 职责: 同一项目的写操作串行执行
// 说明: 只读操作不加锁；不同项目互不阻塞
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 获取项目锁失败（锁中毒）
#[derive(Debug, thiserror::Error)]
#[error("项目锁获取失败: project_id={project_id}, {reason}")]
pub struct ProjectLockError {
    pub project_id: String,
    pub reason: String,
}

/// 项目锁注册表（每个项目一把互斥锁）
#[derive(Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, project_id: &str) -> Result<Arc<Mutex<()>>, ProjectLockError> {
        let mut locks = self.locks.lock().map_err(|e| ProjectLockError {
            project_id: project_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 持有项目锁执行 f（f 返回前不会有同项目的其他写操作）
    pub fn with_lock<T, E>(
        &self,
        project_id: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<ProjectLockError>,
    {
        let handle = self.handle(project_id)?;
        let result = {
            let _guard = handle.lock().map_err(|e| ProjectLockError {
                project_id: project_id.to_string(),
                reason: e.to_string(),
            })?;
            f()
        };
        self.release(project_id, &handle);
        result
    }

    /// 无其他持有者时移除登记项，注册表只保留正在使用的项目
    fn release(&self, project_id: &str, handle: &Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // 引用计数 2 = 注册表 + 当前调用方
        let idle = locks
            .get(project_id)
            .is_some_and(|l| Arc::ptr_eq(l, handle) && Arc::strong_count(l) == 2);
        if idle {
            locks.remove(project_id);
        }
    }

    /// 当前登记（持有或等待中）的项目数
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_project_is_serialized() {
        let locks = Arc::new(ProjectLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    locks
                        .with_lock("P1", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(10));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, ProjectLockError>(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_lock_returns_closure_result() {
        let locks = ProjectLocks::new();
        let r: Result<i32, ProjectLockError> = locks.with_lock("P1", || Ok(7));
        assert_eq!(r.unwrap(), 7);
        let r: Result<i32, ProjectLockError> = locks.with_lock("P2", || {
            Err(ProjectLockError {
                project_id: "P2".into(),
                reason: "业务失败".into(),
            })
        });
        assert!(r.is_err());
        assert!(locks.is_empty());
    }

    #[test]
    fn test_registry_only_holds_projects_in_use() {
        let locks = ProjectLocks::new();
        for i in 0..100 {
            let r: Result<(), ProjectLockError> = locks.with_lock(&format!("P{}", i), || Ok(()));
            r.unwrap();
        }
        assert!(locks.is_empty());

        let r: Result<usize, ProjectLockError> = locks.with_lock("A", || {
            locks.with_lock("B", || Ok(locks.len()))
        });
        assert_eq!(r.unwrap(), 2);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_waiting_writer_keeps_lock_registered() {
        let locks = Arc::new(ProjectLocks::new());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let first = {
            let locks = locks.clone();
            thread::spawn(move || {
                locks
                    .with_lock("P1", || {
                        entered_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(30));
                        Ok::<_, ProjectLockError>(())
                    })
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();

        let inside = Arc::new(AtomicUsize::new(0));
        let second = {
            let locks = locks.clone();
            let inside = inside.clone();
            thread::spawn(move || {
                locks
                    .with_lock("P1", || {
                        // 第一个写操作已退出，同一把锁仍保证互斥
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ProjectLockError>(())
                    })
                    .unwrap();
            })
        };
        first.join().unwrap();
        second.join().unwrap();
        assert!(locks.is_empty());
    }
}
