//! Telemetry event model, serialised as snake_case JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a captured attribute's value came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttributeProvenance {
    /// Instance field of the constructed object.
    Field,
    /// Constructor or method parameter.
    Parameter,
    /// Field inherited from a supertype.
    Inherited,
    /// Static field of the declaring type.
    Static,
}

/// One attribute observed at the event site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapturedAttribute {
    pub name: String,
    pub declared_type: String,
    pub runtime_type: String,
    pub provenance: AttributeProvenance,
}

impl CapturedAttribute {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        runtime_type: impl Into<String>,
        provenance: AttributeProvenance,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            runtime_type: runtime_type.into(),
            provenance,
        }
    }
}

/// Call stack restricted to frames of the observed project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CallStack {
    frames: Vec<String>,
}

impl CallStack {
    /// Keep the frames starting with one of `prefixes`, in order.
    /// An empty prefix list keeps every frame.
    pub fn filtered<I, S>(frames: I, prefixes: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frames = frames
            .into_iter()
            .map(Into::into)
            .filter(|f: &String| prefixes.is_empty() || prefixes.iter().any(|p| f.starts_with(p)))
            .collect();
        Self { frames }
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// One observed constructor-like event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryEvent {
    /// Unique per event; lets the sink recognise re-deliveries.
    pub event_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub source_file: String,
    pub declaring_type: String,
    pub method: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<CapturedAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_stack: Option<CallStack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl TelemetryEvent {
    pub fn new(
        source_file: impl Into<String>,
        declaring_type: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            observed_at: Utc::now(),
            source_file: source_file.into(),
            declaring_type: declaring_type.into(),
            method: method.into(),
            parameter_types: Vec::new(),
            attributes: Vec::new(),
            call_stack: None,
            snapshot: None,
        }
    }

    pub fn with_parameter_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Add an attribute; a later attribute with the same name and provenance replaces the earlier one.
    pub fn with_attribute(mut self, attribute: CapturedAttribute) -> Self {
        self.attributes
            .retain(|a| !(a.name == attribute.name && a.provenance == attribute.provenance));
        self.attributes.push(attribute);
        self
    }

    pub fn with_call_stack(mut self, stack: CallStack) -> Self {
        self.call_stack = (!stack.is_empty()).then_some(stack);
        self
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_stack_filtering() {
        let frames = [
            "java.lang.Thread.run",
            "org.acme.shop.Cart.<init>",
            "org.junit.Runner.run",
            "org.acme.shop.CartTest.adds",
        ];
        let stack = CallStack::filtered(frames, &["org.acme."]);
        assert_eq!(stack.frames(), &["org.acme.shop.Cart.<init>", "org.acme.shop.CartTest.adds"]);

        assert_eq!(CallStack::filtered(frames, &[]).frames().len(), 4);
    }

    #[test]
    fn test_event_json_shape() {
        let event = TelemetryEvent::new("Cart.java", "org.acme.Cart", "<init>")
            .with_parameter_types(["int", "java.lang.String"])
            .with_attribute(CapturedAttribute::new(
                "items",
                "java.util.List",
                "java.util.ArrayList",
                AttributeProvenance::Field,
            ));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["declaring_type"], "org.acme.Cart");
        assert_eq!(value["parameter_types"][1], "java.lang.String");
        assert_eq!(value["attributes"][0]["runtime_type"], "java.util.ArrayList");
        assert_eq!(value["attributes"][0]["provenance"], "field");
        assert!(value.get("call_stack").is_none());
        assert!(value.get("snapshot").is_none());
    }

    #[test]
    fn test_attributes_behave_as_a_set() {
        let attr = |rt: &str| CapturedAttribute::new("x", "Object", rt, AttributeProvenance::Field);
        let event = TelemetryEvent::new("A.java", "A", "<init>")
            .with_attribute(attr("String"))
            .with_attribute(attr("Integer"))
            .with_attribute(CapturedAttribute::new("x", "Object", "Long", AttributeProvenance::Parameter));

        assert_eq!(event.attributes.len(), 2);
        assert_eq!(event.attributes[0].runtime_type, "Integer");
    }

    #[test]
    fn test_empty_stack_is_omitted() {
        let event = TelemetryEvent::new("A.java", "A", "<init>")
            .with_call_stack(CallStack::filtered(["java.lang.Thread.run"], &["org.acme."]));
        assert!(event.call_stack.is_none());
    }
}
