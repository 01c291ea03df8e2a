//! Explicit startup-time registration, standing in for the classpath
//! scanning a reflection-capable runtime would do. An application (or a
//! `#[component]`/`#[controller]` macro expansion) calls `register_*` up
//! front; nothing is discovered by introspecting compiled code.

use std::any::TypeId;
use std::collections::HashMap;

/// One controller's route metadata, gathered from its `#[routes]` block at
/// macro-expansion time and handed to the router at startup.
#[derive(Debug, Clone)]
pub struct RouteRegistration {
    pub method: http::Method,
    pub path: String,
    pub controller_type: TypeId,
    pub controller_name: &'static str,
    pub handler_name: &'static str,
}

/// An entity registered so the CRUD generator and repository synthesizer
/// know it exists, without ever scanning for `#[entity]`-annotated types.
#[derive(Debug, Clone)]
pub struct EntityRegistration {
    pub entity_type: TypeId,
    pub entity_name: &'static str,
    pub table_name: &'static str,
}

/// Any `#[component]`-built bean, filed under the scanner table for the
/// same reason routes and entities are: so the startup ledger can say what
/// exists without anything having to introspect compiled code for it.
#[derive(Debug, Clone)]
pub struct ComponentRegistration {
    pub component_type: TypeId,
    pub component_name: &'static str,
}

/// Accumulates routes and entities discovered at macro-expansion time.
/// Registrations that reference an as-yet-unregistered entity are kept but
/// flagged; they're only promoted to a hard startup failure if something
/// else ends up depending on them (see [`StartupRegistry::unresolved`]).
#[derive(Default)]
pub struct StartupRegistry {
    routes: Vec<RouteRegistration>,
    entities: HashMap<TypeId, EntityRegistration>,
    components: HashMap<TypeId, ComponentRegistration>,
    warnings: Vec<String>,
}

impl StartupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_route(&mut self, route: RouteRegistration) {
        self.routes.push(route);
    }

    pub fn register_entity(&mut self, entity: EntityRegistration) {
        self.entities.insert(entity.entity_type, entity);
    }

    pub fn register_component(&mut self, component: ComponentRegistration) {
        self.components.insert(component.component_type, component);
    }

    /// Registers a repository's entity reference; if the entity itself
    /// hasn't been registered, the repository is recorded as a warning
    /// rather than an immediate failure, per the "skip, never fail on
    /// scan" policy for soft/transitive references.
    pub fn register_repository_entity_ref(&mut self, repository_name: &'static str, entity_type: TypeId) {
        if !self.entities.contains_key(&entity_type) {
            self.warnings.push(format!(
                "repository '{repository_name}' references an entity that was never registered; excluded from the active set"
            ));
        }
    }

    pub fn routes(&self) -> &[RouteRegistration] {
        &self.routes
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRegistration> {
        self.entities.values()
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentRegistration> {
        self.components.values()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_ref_to_a_registered_entity_is_silent() {
        let mut registry = StartupRegistry::new();
        let entity_type = TypeId::of::<u8>();
        registry.register_entity(EntityRegistration { entity_type, entity_name: "Widget", table_name: "widgets" });
        registry.register_repository_entity_ref("widget_repo", entity_type);
        assert!(registry.warnings().is_empty());
    }

    #[test]
    fn repository_ref_to_an_unregistered_entity_warns_but_does_not_panic() {
        let mut registry = StartupRegistry::new();
        registry.register_repository_entity_ref("widget_repo", TypeId::of::<u8>());
        assert_eq!(registry.warnings().len(), 1);
        assert!(registry.warnings()[0].contains("widget_repo"));
    }

    #[test]
    fn registering_a_component_twice_keeps_the_latest() {
        let mut registry = StartupRegistry::new();
        let component_type = TypeId::of::<u8>();
        registry.register_component(ComponentRegistration { component_type, component_name: "WidgetService" });
        registry.register_component(ComponentRegistration { component_type, component_name: "WidgetService" });
        assert_eq!(registry.components().count(), 1);
    }

    #[test]
    fn routes_and_entities_are_retained_in_registration_order() {
        let mut registry = StartupRegistry::new();
        registry.register_route(RouteRegistration {
            method: http::Method::GET,
            path: "/widgets".to_string(),
            controller_type: TypeId::of::<u8>(),
            controller_name: "WidgetController",
            handler_name: "find_all",
        });
        assert_eq!(registry.routes().len(), 1);
        assert_eq!(registry.routes()[0].path, "/widgets");
    }
}
