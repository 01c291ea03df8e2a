//! The CRUD endpoint generator: which operations exist, how a
//! user-declared method suppresses the generated one, pagination wrapping,
//! and batch-operation size limits with partial-success reporting.

use std::collections::HashSet;

/// The ten operations the generator can synthesize for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudOp {
    FindAll,
    FindById,
    Create,
    Update,
    Delete,
    Search,
    Count,
    Exists,
    CreateBatch,
    UpdateBatch,
    DeleteBatch,
}

impl CrudOp {
    pub fn all() -> [CrudOp; 11] {
        [
            CrudOp::FindAll,
            CrudOp::FindById,
            CrudOp::Create,
            CrudOp::Update,
            CrudOp::Delete,
            CrudOp::Search,
            CrudOp::Count,
            CrudOp::Exists,
            CrudOp::CreateBatch,
            CrudOp::UpdateBatch,
            CrudOp::DeleteBatch,
        ]
    }

    pub fn method_and_path(&self, base: &str) -> (http::Method, String) {
        use http::Method;
        match self {
            CrudOp::FindAll => (Method::GET, base.to_string()),
            CrudOp::FindById => (Method::GET, format!("{base}/{{id}}")),
            CrudOp::Create => (Method::POST, base.to_string()),
            CrudOp::Update => (Method::PUT, format!("{base}/{{id}}")),
            CrudOp::Delete => (Method::DELETE, format!("{base}/{{id}}")),
            CrudOp::Search => (Method::GET, format!("{base}/search")),
            CrudOp::Count => (Method::GET, format!("{base}/count")),
            CrudOp::Exists => (Method::GET, format!("{base}/exists/{{id}}")),
            CrudOp::CreateBatch => (Method::POST, format!("{base}/batch")),
            CrudOp::UpdateBatch => (Method::PUT, format!("{base}/batch")),
            CrudOp::DeleteBatch => (Method::DELETE, format!("{base}/batch")),
        }
    }
}

/// Ties a registered route back to the generated operation that produced
/// it, so dispatch never has to reverse-parse a path to figure out what a
/// route was for.
#[derive(Debug, Clone)]
pub struct CrudBinding {
    pub entity_name: &'static str,
    pub op: CrudOp,
}

/// Decides which operations to synthesize for an entity: every op in
/// [`CrudOp::all`] except the ones the application declared itself.
pub struct CrudPlan {
    overridden: HashSet<CrudOp>,
    batch_limit: usize,
}

impl CrudPlan {
    pub fn new(batch_limit: usize) -> Self {
        CrudPlan { overridden: HashSet::new(), batch_limit }
    }

    /// Marks `op` as user-declared; the generator will not synthesize it.
    pub fn mark_overridden(&mut self, op: CrudOp) -> &mut Self {
        self.overridden.insert(op);
        self
    }

    pub fn generated_ops(&self) -> Vec<CrudOp> {
        CrudOp::all().into_iter().filter(|op| !self.overridden.contains(op)).collect()
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug)]
pub enum BatchError {
    TooLarge { submitted: usize, limit: usize },
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::TooLarge { submitted, limit } => {
                write!(f, "batch of {submitted} exceeds the limit of {limit}")
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// Runs `op` over every item, rejecting the whole batch up front if it
/// exceeds `plan`'s limit, and otherwise collecting per-item
/// success/failure rather than aborting on the first error.
pub async fn execute_batch<T, R, E, F, Fut>(
    items: Vec<T>,
    plan: &CrudPlan,
    op: F,
) -> Result<BatchResult<R>, BatchError>
where
    F: Fn(T) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
    E: std::fmt::Display,
{
    if items.len() > plan.batch_limit() {
        return Err(BatchError::TooLarge { submitted: items.len(), limit: plan.batch_limit() });
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match op(item).await {
            Ok(value) => succeeded.push(value),
            Err(err) => failed.push(BatchFailure { index, message: err.to_string() }),
        }
    }
    Ok(BatchResult { succeeded, failed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overridden_ops_are_excluded_from_generation() {
        let mut plan = CrudPlan::new(50);
        plan.mark_overridden(CrudOp::FindById);
        let ops = plan.generated_ops();
        assert!(!ops.contains(&CrudOp::FindById));
        assert!(ops.contains(&CrudOp::FindAll));
    }

    #[test]
    fn routes_use_stable_paths() {
        let (method, path) = CrudOp::FindById.method_and_path("/users");
        assert_eq!(method, http::Method::GET);
        assert_eq!(path, "/users/{id}");
    }

    #[tokio::test]
    async fn batch_rejects_oversized_submission() {
        let plan = CrudPlan::new(2);
        let items = vec![1, 2, 3];
        let err = execute_batch(items, &plan, |i: i32| async move { Ok::<_, std::convert::Infallible>(i) })
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::TooLarge { submitted: 3, limit: 2 }));
    }

    #[tokio::test]
    async fn batch_reports_partial_success() {
        let plan = CrudPlan::new(10);
        let items = vec![1, 2, 3];
        let result = execute_batch(items, &plan, |i: i32| async move {
            if i == 2 {
                Err("boom".to_string())
            } else {
                Ok(i)
            }
        })
        .await
        .unwrap();
        assert_eq!(result.succeeded, vec![1, 3]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].index, 1);
    }
}
