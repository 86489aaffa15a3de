//! Services: the self-describing identities registered with the hub.

use serde_json::{Map, Value};
use tracing::debug;

use crate::configuration::{Configuration, ConfigurationParameterValue, ConfigurationStore};
use crate::error::{ModelError, ModelResult, PersistenceResult};
use crate::event::Event;
use crate::function::Function;

/// Variant of a service.
#[derive(Debug, Clone, Default)]
pub enum ServiceKind {
    #[default]
    SmartObject,
    Application,
    /// A service that fronts other services.
    Gateway { services: Vec<Service> },
}

impl ServiceKind {
    /// Class name announced in the registration message.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::SmartObject => "SmartObject",
            Self::Application => "Application",
            Self::Gateway { .. } => "Gateway",
        }
    }
}

/// A service with its events, functions and configuration.
///
/// Events and functions are only reachable through the editing methods so
/// that every response event a function names is always present.
#[derive(Debug, Clone)]
pub struct Service {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub token: String,
    pub kind: ServiceKind,
    configuration: Configuration,
    events: Vec<Event>,
    functions: Vec<Function>,
    store: Option<ConfigurationStore>,
}

impl Service {
    pub fn new(
        kind: ServiceKind,
        uuid: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            description: description.into(),
            token: token.into(),
            kind,
            configuration: Configuration::default(),
            events: Vec::new(),
            functions: Vec::new(),
            store: None,
        }
    }

    pub fn smart_object(
        uuid: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self::new(ServiceKind::SmartObject, uuid, name, description, token)
    }

    pub fn application(
        uuid: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self::new(ServiceKind::Application, uuid, name, description, token)
    }

    pub fn gateway(
        uuid: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self::new(
            ServiceKind::Gateway {
                services: Vec::new(),
            },
            uuid,
            name,
            description,
            token,
        )
    }

    /// Enables configuration persistence, loading a previously saved
    /// configuration if one exists.
    pub fn with_auto_persist(mut self, store: ConfigurationStore) -> PersistenceResult<Self> {
        if let Some(configuration) = store.load(&self.uuid)? {
            self.configuration = configuration;
        }
        self.store = Some(store);
        Ok(self)
    }

    pub fn auto_persist(&self) -> bool {
        self.store.is_some()
    }

    /// Writes the configuration if persistence is enabled.
    pub fn persist_configuration(&self) -> PersistenceResult<()> {
        match &self.store {
            Some(store) => store.save(&self.uuid, &self.configuration),
            None => Ok(()),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Sub-services of a gateway; empty for other kinds.
    pub fn services(&self) -> &[Service] {
        match &self.kind {
            ServiceKind::Gateway { services } => services,
            _ => &[],
        }
    }

    /// Adds an event.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateEvent`] if an event with the same id exists.
    pub fn add_event(&mut self, event: Event) -> ModelResult<()> {
        if self.has_event(&event.id) {
            return Err(ModelError::DuplicateEvent {
                event_id: event.id,
                service_uuid: self.uuid.clone(),
            });
        }
        debug!(service = %self.uuid, event_id = %event.id, "added event");
        self.events.push(event);
        Ok(())
    }

    /// Adds an event from its JSON description
    /// (`{"eventId", "name", "description", "dataFormat"}`).
    pub fn add_event_raw(&mut self, description: &str) -> ModelResult<()> {
        let event: Event = serde_json::from_str(description)
            .map_err(|e| ModelError::InvalidEventDescription(e.to_string()))?;
        self.add_event(event)
    }

    /// Removes an event.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EventInUse`] if a function still declares it as
    /// a response event.
    pub fn remove_event(&mut self, event_id: &str) -> ModelResult<Option<Event>> {
        if let Some(function) = self.functions.iter().find(|f| f.declares_response(event_id)) {
            return Err(ModelError::EventInUse {
                event_id: event_id.to_string(),
                function_id: function.id.clone(),
            });
        }
        let removed = self
            .events
            .iter()
            .position(|e| e.id == event_id)
            .map(|index| self.events.remove(index));
        if removed.is_some() {
            debug!(service = %self.uuid, event_id, "removed event");
        }
        Ok(removed)
    }

    /// Adds a function.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ResponseEventNotFound`] if one of the function's
    /// response events has not been added to this service.
    pub fn add_function(&mut self, function: Function) -> ModelResult<()> {
        if let Some(missing) = function
            .response_event_ids()
            .iter()
            .find(|id| !self.has_event(id))
        {
            return Err(ModelError::ResponseEventNotFound {
                event_id: missing.clone(),
                service_uuid: self.uuid.clone(),
            });
        }
        debug!(service = %self.uuid, function_id = %function.id, "added function");
        self.functions.push(function);
        Ok(())
    }

    pub fn remove_function(&mut self, function_id: &str) -> Option<Function> {
        let index = self.functions.iter().position(|f| f.id == function_id)?;
        debug!(service = %self.uuid, function_id, "removed function");
        Some(self.functions.remove(index))
    }

    pub fn add_configuration_parameter(
        &mut self,
        name: impl Into<String>,
        value: ConfigurationParameterValue,
    ) {
        let name = name.into();
        debug!(service = %self.uuid, parameter = %name, "added configuration parameter");
        self.configuration.insert(name, value);
    }

    pub fn remove_configuration_parameter(
        &mut self,
        name: &str,
    ) -> Option<ConfigurationParameterValue> {
        self.configuration.remove(name)
    }

    /// Applies pushed configuration values and persists them if enabled.
    pub fn apply_configuration(&mut self, values: &Map<String, Value>) -> PersistenceResult<()> {
        self.configuration.update_values(values);
        self.persist_configuration()
    }

    pub fn event_by_id(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == event_id)
    }

    pub fn function_by_id(&self, function_id: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == function_id)
    }

    pub fn has_event(&self, event_id: &str) -> bool {
        self.event_by_id(event_id).is_some()
    }

    /// Attaches a sub-service to a gateway.
    pub fn add_service(&mut self, service: Service) -> ModelResult<()> {
        match &mut self.kind {
            ServiceKind::Gateway { services } => {
                services.push(service);
                Ok(())
            }
            _ => Err(ModelError::NotAGateway(self.uuid.clone())),
        }
    }

    /// Detaches a sub-service from a gateway.
    pub fn remove_service(&mut self, uuid: &str) -> ModelResult<Option<Service>> {
        match &mut self.kind {
            ServiceKind::Gateway { services } => Ok(services
                .iter()
                .position(|s| s.uuid == uuid)
                .map(|index| services.remove(index))),
            _ => Err(ModelError::NotAGateway(self.uuid.clone())),
        }
    }

    /// Numbers events by position and points every function's response
    /// references at those numbers. Sub-services are numbered independently.
    pub fn assign_ref_ids(&mut self) {
        for (index, event) in self.events.iter_mut().enumerate() {
            event.ref_id = index as u32;
        }

        let events = &self.events;
        for function in &mut self.functions {
            let mut refs = Vec::with_capacity(function.response_event_ids().len());
            for id in function.response_event_ids() {
                let Some(event) = events.iter().find(|e| &e.id == id) else {
                    continue;
                };
                if !refs.contains(&event.ref_id) {
                    refs.push(event.ref_id);
                }
            }
            function.response_event_refs = refs;
        }

        if let ServiceKind::Gateway { services } = &mut self.kind {
            for service in services {
                service.assign_ref_ids();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;
    use crate::function::{Invocable, ParameterSlot, ParameterType};
    use crate::schema::DataFormat;
    use serde_json::json;
    use tempfile::TempDir;

    fn event(id: &str) -> Event {
        Event::without_data(id, id, "")
    }

    fn responder(id: &str, events: &[&str]) -> Function {
        Function::new(
            id,
            id,
            "",
            vec![ParameterSlot::new("x", ParameterType::Integer, 0)],
            events.iter().map(|s| s.to_string()).collect(),
            Invocable::responder(|_, _| Ok(EventData::no_response())),
        )
        .unwrap()
    }

    fn service() -> Service {
        Service::smart_object("svc-1", "Sensor", "A sensor", "token")
    }

    #[test]
    fn duplicate_event_is_rejected() {
        let mut svc = service();
        svc.add_event(event("a")).unwrap();
        assert!(matches!(
            svc.add_event(event("a")),
            Err(ModelError::DuplicateEvent { .. })
        ));
        assert_eq!(svc.events().len(), 1);
    }

    #[test]
    fn function_requires_response_events_present() {
        let mut svc = service();
        let err = svc.add_function(responder("f", &["done"])).unwrap_err();
        assert!(matches!(err, ModelError::ResponseEventNotFound { ref event_id, .. } if event_id == "done"));

        svc.add_event(event("done")).unwrap();
        svc.add_function(responder("f", &["done"])).unwrap();
        assert!(svc.function_by_id("f").is_some());
    }

    #[test]
    fn response_event_cannot_be_removed() {
        let mut svc = service();
        svc.add_event(event("done")).unwrap();
        svc.add_function(responder("f", &["done"])).unwrap();
        assert!(matches!(
            svc.remove_event("done"),
            Err(ModelError::EventInUse { .. })
        ));

        svc.remove_function("f").unwrap();
        assert!(svc.remove_event("done").unwrap().is_some());
        assert!(svc.remove_event("done").unwrap().is_none());
    }

    #[test]
    fn raw_event_description() {
        let mut svc = service();
        svc.add_event_raw(
            r#"{"eventId":"temp","name":"Temp","description":"t","dataFormat":{"dataObject":{"type":"number"}}}"#,
        )
        .unwrap();
        let temp = svc.event_by_id("temp").unwrap();
        assert_eq!(
            temp.data_format,
            DataFormat::primitive("dataObject", "number", None)
        );
        assert!(matches!(
            svc.add_event_raw("{"),
            Err(ModelError::InvalidEventDescription(_))
        ));
    }

    #[test]
    fn ref_ids_follow_event_positions() {
        let mut svc = service();
        for id in ["a", "b", "c"] {
            svc.add_event(event(id)).unwrap();
        }
        svc.add_function(responder("f", &["c", "a", "c"])).unwrap();
        svc.assign_ref_ids();

        let ids: Vec<u32> = svc.events().iter().map(|e| e.ref_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(svc.function_by_id("f").unwrap().response_event_refs, vec![2, 0]);

        svc.remove_function("f");
        svc.remove_event("a").unwrap();
        svc.assign_ref_ids();
        assert_eq!(svc.event_by_id("c").unwrap().ref_id, 1);
    }

    #[test]
    fn only_gateways_hold_services() {
        let mut gw = Service::gateway("gw", "Gateway", "", "t");
        gw.add_service(service()).unwrap();
        assert_eq!(gw.services().len(), 1);
        assert_eq!(gw.kind.class_name(), "Gateway");
        assert!(gw.remove_service("svc-1").unwrap().is_some());

        let mut plain = service();
        assert!(matches!(
            plain.add_service(service()),
            Err(ModelError::NotAGateway(_))
        ));
    }

    #[test]
    fn auto_persist_loads_and_saves() {
        let dir = TempDir::new().unwrap();
        let store = ConfigurationStore::new(dir.path());

        let mut svc = service().with_auto_persist(store.clone()).unwrap();
        svc.add_configuration_parameter("level", ConfigurationParameterValue::new(json!(1)));
        let mut pushed = Map::new();
        pushed.insert("level".into(), json!(3));
        svc.apply_configuration(&pushed).unwrap();

        let reloaded = service().with_auto_persist(store).unwrap();
        assert_eq!(
            reloaded.configuration().get("level").map(|p| &p.value),
            Some(&json!(3))
        );
    }
}
