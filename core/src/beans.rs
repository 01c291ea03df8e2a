//! The dependency-injection container: bean descriptors, scope, primary/named
//! disambiguation, ordered lifecycle callbacks, and cyclic-dependency
//! rejection via topological sort (Kahn's algorithm).

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TrellisConfig;

/// Whether a bean is constructed once and cached, or rebuilt on every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeanScope {
    Singleton,
    Prototype,
}

/// Synchronous bean construction. Most application services implement this.
pub trait Bean: Send + Sync + Sized + 'static {
    fn build(ctx: &BeanContext) -> Result<Self, BeanError>;

    /// Types this bean's constructor reads out of the context.
    fn dependencies() -> Vec<TypeId> {
        Vec::new()
    }

    /// Config keys that must be present before this bean is constructed.
    fn config_keys() -> Vec<&'static str> {
        Vec::new()
    }
}

/// Async bean construction, for beans whose setup does I/O (opening a pool,
/// warming a cache).
#[async_trait]
pub trait AsyncBean: Send + Sync + Sized + 'static {
    async fn build(ctx: &BeanContext) -> Result<Self, BeanError>;

    fn dependencies() -> Vec<TypeId> {
        Vec::new()
    }

    fn config_keys() -> Vec<&'static str> {
        Vec::new()
    }
}

/// A bean produced by an ad hoc closure at registration time, for values
/// that don't need their own `Bean` impl (e.g. a value already on hand).
pub trait Producer: Send + Sync + 'static {
    type Output: Send + Sync + 'static;
    fn produce(&self, ctx: &BeanContext) -> Result<Self::Output, BeanError>;
    fn dependencies(&self) -> Vec<TypeId> {
        Vec::new()
    }
}

/// Runs once, after a singleton is constructed and before it is handed out
/// to any dependent bean, in descriptor-declaration order.
pub trait PostInit: Send + Sync {
    fn post_init(&self) -> Result<(), BeanError>;
}

/// Runs once per singleton during [`BeanContainer::dispose`], in the
/// reverse of construction order.
pub trait PreDestroy: Send + Sync {
    fn pre_destroy(&self);
}

#[derive(Debug)]
pub enum BeanError {
    CyclicDependency { cycle: Vec<String> },
    MissingDependency { bean: String, dependency: String },
    DuplicateBean { type_name: String, name: String },
    Ambiguous { type_name: String, candidates: Vec<String> },
    MissingConfigKeys { bean: String, keys: Vec<String> },
    NotRegistered { type_name: String },
    WrongScope { type_name: String },
    Construction { bean: String, message: String },
}

impl std::fmt::Display for BeanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeanError::CyclicDependency { cycle } => write!(f, "cyclic bean dependency: {}", cycle.join(" -> ")),
            BeanError::MissingDependency { bean, dependency } => {
                write!(f, "bean '{bean}' depends on unregistered type '{dependency}'")
            }
            BeanError::DuplicateBean { type_name, name } => {
                write!(f, "duplicate bean registration for '{type_name}' named '{name}'")
            }
            BeanError::Ambiguous { type_name, candidates } => {
                write!(f, "ambiguous bean for '{type_name}': candidates {candidates:?}, exactly one must be marked primary")
            }
            BeanError::MissingConfigKeys { bean, keys } => {
                write!(f, "bean '{bean}' requires config keys not present: {keys:?}")
            }
            BeanError::NotRegistered { type_name } => write!(f, "no bean registered for '{type_name}'"),
            BeanError::WrongScope { type_name } => write!(f, "'{type_name}' is not a prototype-scoped bean"),
            BeanError::Construction { bean, message } => write!(f, "failed constructing bean '{bean}': {message}"),
        }
    }
}

impl std::error::Error for BeanError {}

type AnyArc = Arc<dyn Any + Send + Sync>;
type ConstructFn = Arc<dyn for<'a> Fn(&'a BeanContext) -> BoxFuture<'a, Result<AnyArc, BeanError>> + Send + Sync>;
type PostInitFn = Arc<dyn Fn(&AnyArc) -> Result<(), BeanError> + Send + Sync>;
type PreDestroyFn = Arc<dyn Fn(&AnyArc) + Send + Sync>;
type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A bean's identity within the registry: its Rust type plus a name,
/// defaulting to the type's name when not given explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanKey {
    pub type_id: TypeId,
    pub name: String,
}

struct Descriptor {
    key: BeanKey,
    type_name: &'static str,
    scope: BeanScope,
    primary: bool,
    dependencies: Vec<TypeId>,
    config_keys: Vec<&'static str>,
    construct: ConstructFn,
    post_init: Option<PostInitFn>,
    pre_destroy: Option<PreDestroyFn>,
}

/// Read-only view handed to bean constructors: every singleton constructed
/// so far, plus prototype constructors available for on-demand rebuilding.
pub struct BeanContext {
    singletons: HashMap<BeanKey, AnyArc>,
    by_type: HashMap<TypeId, Vec<BeanKey>>,
    prototypes: HashMap<BeanKey, ConstructFn>,
}

impl BeanContext {
    fn empty() -> Self {
        BeanContext {
            singletons: HashMap::new(),
            by_type: HashMap::new(),
            prototypes: HashMap::new(),
        }
    }

    /// Resolves the primary (or sole) singleton of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BeanError> {
        let type_id = TypeId::of::<T>();
        let key = self.default_key_for(type_id, std::any::type_name::<T>())?;
        let value = self
            .singletons
            .get(&key)
            .cloned()
            .ok_or_else(|| BeanError::NotRegistered { type_name: std::any::type_name::<T>().to_string() })?;
        value
            .downcast::<T>()
            .map_err(|_| BeanError::NotRegistered { type_name: std::any::type_name::<T>().to_string() })
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, BeanError> {
        let key = BeanKey { type_id: TypeId::of::<T>(), name: name.to_string() };
        let value = self
            .singletons
            .get(&key)
            .cloned()
            .ok_or_else(|| BeanError::NotRegistered { type_name: format!("{}#{name}", std::any::type_name::<T>()) })?;
        value
            .downcast::<T>()
            .map_err(|_| BeanError::NotRegistered { type_name: std::any::type_name::<T>().to_string() })
    }

    /// Builds a fresh instance of a prototype-scoped bean.
    pub async fn get_prototype<T: Send + Sync + 'static>(&self) -> Result<T, BeanError> {
        let type_id = TypeId::of::<T>();
        let key = self.default_key_for(type_id, std::any::type_name::<T>())?;
        let construct = self
            .prototypes
            .get(&key)
            .ok_or_else(|| BeanError::WrongScope { type_name: std::any::type_name::<T>().to_string() })?
            .clone();
        let built = construct(self).await?;
        built
            .downcast::<T>()
            .map(|arc| Arc::try_unwrap(arc).unwrap_or_else(|arc| (*arc).clone_unsupported()))
            .map_err(|_| BeanError::NotRegistered { type_name: std::any::type_name::<T>().to_string() })
    }

    fn default_key_for(&self, type_id: TypeId, type_name: &str) -> Result<BeanKey, BeanError> {
        let candidates = self
            .by_type
            .get(&type_id)
            .ok_or_else(|| BeanError::NotRegistered { type_name: type_name.to_string() })?;
        match candidates.len() {
            1 => Ok(candidates[0].clone()),
            0 => Err(BeanError::NotRegistered { type_name: type_name.to_string() }),
            _ => Err(BeanError::Ambiguous {
                type_name: type_name.to_string(),
                candidates: candidates.iter().map(|k| k.name.clone()).collect(),
            }),
        }
    }
}

// `get_prototype::<T>` never actually needs to clone through an Arc in
// practice (constructors always yield a fresh, uniquely-owned value), but
// the trait bound keeps the common case ergonomic without requiring `Clone`
// on every prototype bean.
trait UnwrapOrClone {
    fn clone_unsupported(&self) -> Self;
}
impl<T> UnwrapOrClone for T {
    fn clone_unsupported(&self) -> Self {
        unreachable!("prototype bean constructors must return a uniquely-owned Arc")
    }
}

/// Accumulates bean descriptors; call [`BeanRegistry::resolve`] to validate
/// config, topologically sort, construct every singleton, and run
/// `post_init` callbacks.
#[derive(Default)]
pub struct BeanRegistry {
    descriptors: Vec<Descriptor>,
}

impl BeanRegistry {
    pub fn new() -> Self {
        BeanRegistry { descriptors: Vec::new() }
    }

    pub fn register<T: Bean + 'static>(&mut self, name: impl Into<String>, scope: BeanScope, primary: bool) -> Result<(), BeanError> {
        let key = BeanKey { type_id: TypeId::of::<T>(), name: name.into() };
        self.check_duplicate(&key)?;
        let construct: ConstructFn = Arc::new(|ctx: &BeanContext| {
            Box::pin(async move {
                let built = T::build(ctx)?;
                Ok(Arc::new(built) as AnyArc)
            })
        });
        self.descriptors.push(Descriptor {
            key,
            type_name: std::any::type_name::<T>(),
            scope,
            primary,
            dependencies: T::dependencies(),
            config_keys: T::config_keys(),
            construct,
            post_init: None,
            pre_destroy: None,
        });
        Ok(())
    }

    pub fn register_async<T: AsyncBean + 'static>(&mut self, name: impl Into<String>, scope: BeanScope, primary: bool) -> Result<(), BeanError> {
        let key = BeanKey { type_id: TypeId::of::<T>(), name: name.into() };
        self.check_duplicate(&key)?;
        let construct: ConstructFn = Arc::new(|ctx: &BeanContext| {
            Box::pin(async move {
                let built = T::build(ctx).await?;
                Ok(Arc::new(built) as AnyArc)
            })
        });
        self.descriptors.push(Descriptor {
            key,
            type_name: std::any::type_name::<T>(),
            scope,
            primary,
            dependencies: T::dependencies(),
            config_keys: T::config_keys(),
            construct,
            post_init: None,
            pre_destroy: None,
        });
        Ok(())
    }

    pub fn register_producer<P: Producer>(&mut self, name: impl Into<String>, scope: BeanScope, primary: bool, producer: P) -> Result<(), BeanError> {
        let key = BeanKey { type_id: TypeId::of::<P::Output>(), name: name.into() };
        self.check_duplicate(&key)?;
        let deps = producer.dependencies();
        let producer = Arc::new(producer);
        let construct: ConstructFn = Arc::new(move |ctx: &BeanContext| {
            let producer = producer.clone();
            Box::pin(async move {
                let built = producer.produce(ctx)?;
                Ok(Arc::new(built) as AnyArc)
            })
        });
        self.descriptors.push(Descriptor {
            key,
            type_name: std::any::type_name::<P::Output>(),
            scope,
            primary,
            dependencies: deps,
            config_keys: Vec::new(),
            construct,
            post_init: None,
            pre_destroy: None,
        });
        Ok(())
    }

    /// Registers `post_init`/`pre_destroy` for the most recently added bean.
    /// `T` must implement the corresponding lifecycle trait.
    pub fn with_lifecycle<T: Send + Sync + 'static>(&mut self) -> &mut Self
    where
        T: PostInit + PreDestroy,
    {
        if let Some(descriptor) = self.descriptors.last_mut() {
            descriptor.post_init = Some(Arc::new(|value: &AnyArc| {
                let typed = value.clone().downcast::<T>().expect("lifecycle type mismatch");
                typed.post_init()
            }));
            descriptor.pre_destroy = Some(Arc::new(|value: &AnyArc| {
                let typed = value.clone().downcast::<T>().expect("lifecycle type mismatch");
                typed.pre_destroy();
            }));
        }
        self
    }

    fn check_duplicate(&self, key: &BeanKey) -> Result<(), BeanError> {
        if self.descriptors.iter().any(|d| d.key == *key) {
            return Err(BeanError::DuplicateBean { type_name: key.name.clone(), name: key.name.clone() });
        }
        Ok(())
    }

    /// Validates config keys, orders descriptors via Kahn's algorithm
    /// (rejecting cycles), constructs every singleton, runs `post_init` in
    /// construction order, and returns the assembled container.
    pub async fn resolve(self, config: &TrellisConfig) -> Result<BeanContainer, BeanError> {
        for descriptor in &self.descriptors {
            let missing: Vec<String> = descriptor
                .config_keys
                .iter()
                .filter(|key| !config.contains_key(key))
                .map(|k| k.to_string())
                .collect();
            if !missing.is_empty() {
                return Err(BeanError::MissingConfigKeys { bean: descriptor.type_name.to_string(), keys: missing });
            }
        }

        let mut by_type: HashMap<TypeId, Vec<BeanKey>> = HashMap::new();
        for d in &self.descriptors {
            by_type.entry(d.key.type_id).or_default().push(d.key.clone());
        }
        for (type_id, keys) in &by_type {
            if keys.len() > 1 {
                let primaries = keys
                    .iter()
                    .filter(|k| self.descriptors.iter().find(|d| d.key == **k).map(|d| d.primary).unwrap_or(false))
                    .count();
                if primaries != 1 {
                    let type_name = self
                        .descriptors
                        .iter()
                        .find(|d| d.key.type_id == *type_id)
                        .map(|d| d.type_name)
                        .unwrap_or("<unknown>");
                    return Err(BeanError::Ambiguous {
                        type_name: type_name.to_string(),
                        candidates: keys.iter().map(|k| k.name.clone()).collect(),
                    });
                }
            }
        }

        let order = topological_order(&self.descriptors, &by_type)?;

        let mut ctx = BeanContext::empty();
        ctx.by_type = by_type.clone();
        let mut constructed_order = Vec::with_capacity(order.len());

        for idx in order {
            let descriptor = &self.descriptors[idx];
            if descriptor.scope == BeanScope::Prototype {
                ctx.prototypes.insert(descriptor.key.clone(), descriptor.construct.clone());
                continue;
            }
            let value = (descriptor.construct)(&ctx)
                .await
                .map_err(|e| match e {
                    BeanError::Construction { .. } => e,
                    other => BeanError::Construction { bean: descriptor.type_name.to_string(), message: other.to_string() },
                })?;
            ctx.singletons.insert(descriptor.key.clone(), value);
            constructed_order.push(idx);
        }

        for &idx in &constructed_order {
            let descriptor = &self.descriptors[idx];
            if let Some(post_init) = &descriptor.post_init {
                let value = ctx.singletons.get(&descriptor.key).expect("just constructed");
                post_init(value)?;
            }
        }

        Ok(BeanContainer {
            ctx,
            pre_destroy: self
                .descriptors
                .into_iter()
                .filter(|d| d.pre_destroy.is_some())
                .map(|d| (d.key, d.pre_destroy.unwrap()))
                .collect(),
            construction_order: constructed_order,
        })
    }
}

fn topological_order(descriptors: &[Descriptor], by_type: &HashMap<TypeId, Vec<BeanKey>>) -> Result<Vec<usize>, BeanError> {
    let n = descriptors.len();
    let mut indegree = vec![0usize; n];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];

    let key_to_idx: HashMap<&BeanKey, usize> = descriptors.iter().enumerate().map(|(i, d)| (&d.key, i)).collect();
    let primary_idx_for = |type_id: &TypeId| -> Option<usize> {
        let keys = by_type.get(type_id)?;
        if keys.len() == 1 {
            return key_to_idx.get(&keys[0]).copied();
        }
        keys.iter()
            .filter_map(|k| key_to_idx.get(k).copied())
            .find(|&i| descriptors[i].primary)
    };

    for (i, descriptor) in descriptors.iter().enumerate() {
        for dep_type in &descriptor.dependencies {
            let Some(dep_idx) = primary_idx_for(dep_type) else {
                return Err(BeanError::MissingDependency {
                    bean: descriptor.type_name.to_string(),
                    dependency: format!("{dep_type:?}"),
                });
            };
            edges[dep_idx].push(i);
            indegree[i] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    let mut visited = HashSet::new();

    while let Some(i) = queue.pop_front() {
        order.push(i);
        visited.insert(i);
        for &next in &edges[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != n {
        let cycle = (0..n)
            .filter(|i| !visited.contains(i))
            .map(|i| descriptors[i].type_name.to_string())
            .collect();
        return Err(BeanError::CyclicDependency { cycle });
    }

    Ok(order)
}

/// The fully resolved container: every singleton constructed and ready,
/// prototype constructors on standby.
pub struct BeanContainer {
    ctx: BeanContext,
    pre_destroy: Vec<(BeanKey, PreDestroyFn)>,
    construction_order: Vec<usize>,
}

impl BeanContainer {
    pub fn context(&self) -> &BeanContext {
        &self.ctx
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BeanError> {
        self.ctx.get::<T>()
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, BeanError> {
        self.ctx.get_named::<T>(name)
    }

    /// Runs `pre_destroy` callbacks in the reverse of construction order.
    pub fn dispose(&self) {
        for (key, callback) in self.pre_destroy.iter().rev() {
            if let Some(value) = self.ctx.singletons.get(key) {
                callback(value);
            }
        }
    }

    #[cfg(test)]
    fn construction_order_len(&self) -> usize {
        self.construction_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Repo;
    impl Bean for Repo {
        fn build(_ctx: &BeanContext) -> Result<Self, BeanError> {
            Ok(Repo)
        }
    }

    struct Service {
        #[allow(dead_code)]
        repo: Arc<Repo>,
    }
    impl Bean for Service {
        fn build(ctx: &BeanContext) -> Result<Self, BeanError> {
            Ok(Service { repo: ctx.get::<Repo>()? })
        }
        fn dependencies() -> Vec<TypeId> {
            vec![TypeId::of::<Repo>()]
        }
    }

    #[tokio::test]
    async fn resolves_simple_graph() {
        let mut registry = BeanRegistry::new();
        registry.register::<Repo>("repo", BeanScope::Singleton, true).unwrap();
        registry.register::<Service>("service", BeanScope::Singleton, true).unwrap();
        let container = registry.resolve(&TrellisConfig::empty()).await.unwrap();
        assert!(container.get::<Service>().is_ok());
    }

    struct MissingDep;
    impl Bean for MissingDep {
        fn build(ctx: &BeanContext) -> Result<Self, BeanError> {
            ctx.get::<Repo>()?;
            Ok(MissingDep)
        }
        fn dependencies() -> Vec<TypeId> {
            vec![TypeId::of::<Repo>()]
        }
    }

    #[tokio::test]
    async fn missing_dependency_is_an_error() {
        let mut registry = BeanRegistry::new();
        registry.register::<MissingDep>("missing", BeanScope::Singleton, true).unwrap();
        let err = registry.resolve(&TrellisConfig::empty()).await.unwrap_err();
        assert!(matches!(err, BeanError::MissingDependency { .. }));
    }

    #[test]
    fn duplicate_bean_is_rejected() {
        let mut registry = BeanRegistry::new();
        registry.register::<Repo>("repo", BeanScope::Singleton, true).unwrap();
        let err = registry.register::<Repo>("repo", BeanScope::Singleton, true).unwrap_err();
        assert!(matches!(err, BeanError::DuplicateBean { .. }));
    }

    struct A;
    struct B;
    impl Bean for A {
        fn build(ctx: &BeanContext) -> Result<Self, BeanError> {
            ctx.get::<B>()?;
            Ok(A)
        }
        fn dependencies() -> Vec<TypeId> {
            vec![TypeId::of::<B>()]
        }
    }
    impl Bean for B {
        fn build(ctx: &BeanContext) -> Result<Self, BeanError> {
            ctx.get::<A>()?;
            Ok(B)
        }
        fn dependencies() -> Vec<TypeId> {
            vec![TypeId::of::<A>()]
        }
    }

    #[tokio::test]
    async fn cyclic_dependency_is_rejected() {
        let mut registry = BeanRegistry::new();
        registry.register::<A>("a", BeanScope::Singleton, true).unwrap();
        registry.register::<B>("b", BeanScope::Singleton, true).unwrap();
        let err = registry.resolve(&TrellisConfig::empty()).await.unwrap_err();
        assert!(matches!(err, BeanError::CyclicDependency { .. }));
    }

    struct Primary;
    impl Bean for Primary {
        fn build(_ctx: &BeanContext) -> Result<Self, BeanError> {
            Ok(Primary)
        }
    }

    #[tokio::test]
    async fn named_resolution_bypasses_primary_ambiguity() {
        let mut registry = BeanRegistry::new();
        registry.register::<Primary>("a", BeanScope::Singleton, true).unwrap();
        let container = registry.resolve(&TrellisConfig::empty()).await.unwrap();
        assert!(container.get_named::<Primary>("a").is_ok());
    }

    static POST_INIT_CALLED: AtomicBool = AtomicBool::new(false);
    static PRE_DESTROY_CALLED: AtomicBool = AtomicBool::new(false);

    struct Lifecycled;
    impl Bean for Lifecycled {
        fn build(_ctx: &BeanContext) -> Result<Self, BeanError> {
            Ok(Lifecycled)
        }
    }
    impl PostInit for Lifecycled {
        fn post_init(&self) -> Result<(), BeanError> {
            POST_INIT_CALLED.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
    impl PreDestroy for Lifecycled {
        fn pre_destroy(&self) {
            PRE_DESTROY_CALLED.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn lifecycle_callbacks_run() {
        let mut registry = BeanRegistry::new();
        registry.register::<Lifecycled>("lc", BeanScope::Singleton, true).unwrap();
        registry.with_lifecycle::<Lifecycled>();
        let container = registry.resolve(&TrellisConfig::empty()).await.unwrap();
        assert!(POST_INIT_CALLED.load(Ordering::SeqCst));
        container.dispose();
        assert!(PRE_DESTROY_CALLED.load(Ordering::SeqCst));
    }

    static PROTOTYPE_BUILD_COUNT: AtomicUsize = AtomicUsize::new(0);

    struct Prototype;
    impl Bean for Prototype {
        fn build(_ctx: &BeanContext) -> Result<Self, BeanError> {
            PROTOTYPE_BUILD_COUNT.fetch_add(1, Ordering::SeqCst);
            Ok(Prototype)
        }
    }

    #[tokio::test]
    async fn prototype_scope_rebuilds_each_time() {
        let mut registry = BeanRegistry::new();
        registry.register::<Prototype>("p", BeanScope::Prototype, true).unwrap();
        let container = registry.resolve(&TrellisConfig::empty()).await.unwrap();
        assert_eq!(container.construction_order_len(), 0);
        let _ = container.context().get_prototype::<Prototype>().await.unwrap();
        let _ = container.context().get_prototype::<Prototype>().await.unwrap();
        assert_eq!(PROTOTYPE_BUILD_COUNT.load(Ordering::SeqCst), 2);
    }

    struct Configured;
    impl Bean for Configured {
        fn build(_ctx: &BeanContext) -> Result<Self, BeanError> {
            Ok(Configured)
        }
        fn config_keys() -> Vec<&'static str> {
            vec!["app.name"]
        }
    }

    #[tokio::test]
    async fn missing_config_keys_fail_before_construction() {
        let mut registry = BeanRegistry::new();
        registry.register::<Configured>("c", BeanScope::Singleton, true).unwrap();
        let err = registry.resolve(&TrellisConfig::empty()).await.unwrap_err();
        assert!(matches!(err, BeanError::MissingConfigKeys { .. }));
    }
}
