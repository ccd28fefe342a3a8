//! # Handler Registry
//!
//! Workers never load code. The owning process registers every route module
//! and middleware up front under a module path, and hands the registry to the
//! pool next to the plain [`WorkerRouterData`] that says which route id uses
//! which module path.
//!
//! ```rust
//! use keiro::registry::{HandlerRegistry, RouteModule, WorkerRouterData};
//! use keiro::web::Response;
//! use http::StatusCode;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_route(
//!     "routes/users/[id]",
//!     RouteModule::new().get(|ev| {
//!         Ok(Response::text(StatusCode::OK, format!("user {}", ev.param("id").unwrap_or("?"))))
//!     }),
//! );
//!
//! let data = WorkerRouterData::new().route("/users/[id]", "routes/users/[id]");
//! let resolved = registry.resolve(&data).unwrap();
//! assert_eq!(resolved.route_count(), 1);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::handler::{Handler, HandlerResult, RequestEvent};
use crate::middleware::Middleware;
use crate::router::{RoutePattern, RouteTable};

/// Route data given to every worker of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRouterData {
    /// Route id → module path
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found_path: Option<String>,
}

impl WorkerRouterData {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(mut self, route_id: impl Into<String>, module_path: impl Into<String>) -> Self {
        self.routes.insert(route_id.into(), module_path.into());
        self
    }

    #[must_use]
    pub fn middleware(mut self, module_path: impl Into<String>) -> Self {
        self.middleware_path = Some(module_path.into());
        self
    }

    #[must_use]
    pub fn not_found(mut self, module_path: impl Into<String>) -> Self {
        self.not_found_path = Some(module_path.into());
        self
    }
}

/// Method-keyed handlers for one route, plus an optional catch-all handler.
#[derive(Default, Clone)]
pub struct RouteModule {
    handlers: HashMap<Method, Handler>,
    fallback: Option<Handler>,
}

impl RouteModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one method, replacing any previous one.
    #[must_use]
    pub fn on<F>(mut self, method: Method, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.insert(method, Arc::new(handler));
        self
    }

    #[must_use]
    pub fn get<F>(self, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Method::GET, handler)
    }

    #[must_use]
    pub fn post<F>(self, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Method::POST, handler)
    }

    #[must_use]
    pub fn put<F>(self, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Method::PUT, handler)
    }

    #[must_use]
    pub fn patch<F>(self, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Method::PATCH, handler)
    }

    #[must_use]
    pub fn delete<F>(self, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(Method::DELETE, handler)
    }

    /// Handler used for any method without a dedicated one.
    #[must_use]
    pub fn fallback<F>(mut self, handler: F) -> Self
    where
        F: Fn(RequestEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// The method's handler, else the fallback.
    pub fn handler_for(&self, method: &Method) -> Option<&Handler> {
        self.handlers.get(method).or(self.fallback.as_ref())
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.handlers.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("RouteModule")
            .field("methods", &methods)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// A registered module.
#[derive(Clone)]
pub enum Module {
    Route(Arc<RouteModule>),
    Middleware(Arc<dyn Middleware>),
}

/// Module path → module, shared read-only by every worker.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    modules: HashMap<String, Module>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_route(&mut self, path: impl Into<String>, module: RouteModule) -> &mut Self {
        self.modules
            .insert(path.into(), Module::Route(Arc::new(module)));
        self
    }

    pub fn register_middleware(
        &mut self,
        path: impl Into<String>,
        middleware: impl Middleware + 'static,
    ) -> &mut Self {
        self.modules
            .insert(path.into(), Module::Middleware(Arc::new(middleware)));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn route_module(&self, path: &str) -> Result<Arc<RouteModule>, RegistryError> {
        match self.modules.get(path) {
            Some(Module::Route(module)) => Ok(Arc::clone(module)),
            Some(Module::Middleware(_)) => Err(RegistryError::NotARouteModule {
                path: path.to_string(),
            }),
            None => Err(RegistryError::UnknownModule {
                path: path.to_string(),
            }),
        }
    }

    pub fn middleware(&self, path: &str) -> Result<Arc<dyn Middleware>, RegistryError> {
        match self.modules.get(path) {
            Some(Module::Middleware(mw)) => Ok(Arc::clone(mw)),
            Some(Module::Route(_)) => Err(RegistryError::NotAMiddleware {
                path: path.to_string(),
            }),
            None => Err(RegistryError::UnknownModule {
                path: path.to_string(),
            }),
        }
    }

    /// Resolve every module path named by `data`.
    ///
    /// Fails on the first route id that does not parse or module path that
    /// is missing or of the wrong kind.
    pub fn resolve(&self, data: &WorkerRouterData) -> Result<ResolvedRouter, RegistryError> {
        let routes = data
            .routes
            .iter()
            .map(|(route_id, path)| {
                let pattern = RoutePattern::parse(route_id)?;
                Ok((pattern, self.route_module(path)?))
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        let middleware = data
            .middleware_path
            .as_deref()
            .map(|path| self.middleware(path))
            .transpose()?;
        let not_found = data
            .not_found_path
            .as_deref()
            .map(|path| self.route_module(path))
            .transpose()?;

        Ok(ResolvedRouter {
            routes,
            middleware,
            not_found,
        })
    }
}

/// Router data with every module path resolved. Each worker builds its own
/// [`RouteTable`] from it at startup.
#[derive(Clone)]
pub struct ResolvedRouter {
    routes: Vec<(RoutePattern, Arc<RouteModule>)>,
    middleware: Option<Arc<dyn Middleware>>,
    not_found: Option<Arc<RouteModule>>,
}

impl ResolvedRouter {
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn build_table(&self) -> RouteTable<Arc<RouteModule>> {
        let mut table = RouteTable::new();
        for (pattern, module) in &self.routes {
            table.insert(pattern, Arc::clone(module));
        }
        table
    }

    pub fn middleware(&self) -> Option<&Arc<dyn Middleware>> {
        self.middleware.as_ref()
    }

    pub fn not_found(&self) -> Option<&Arc<RouteModule>> {
        self.not_found.as_ref()
    }
}
