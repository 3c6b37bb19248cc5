use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    saml_assertions: IntCounterVec,
    saml_callbacks: IntCounterVec,
    contact_lookups: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let saml_assertions = IntCounterVec::new(
            Opts::new(
                "saml_assertions_total",
                "Count of SAML responses received grouped by validation outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(saml_assertions.clone()))?;

        let saml_callbacks = IntCounterVec::new(
            Opts::new(
                "saml_callbacks_total",
                "Count of assertion callbacks grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(saml_callbacks.clone()))?;

        let contact_lookups = IntCounterVec::new(
            Opts::new("contact_lookups_total", "Count of support contact lookups"),
            &["outcome"],
        )?;
        registry.register(Box::new(contact_lookups.clone()))?;

        Ok(Self {
            registry,
            saml_assertions,
            saml_callbacks,
            contact_lookups,
        })
    }

    pub fn saml_assertion(&self, outcome: &str) {
        self.saml_assertions.with_label_values(&[outcome]).inc();
    }

    pub fn saml_callback(&self, outcome: &str) {
        self.saml_callbacks.with_label_values(&[outcome]).inc();
    }

    pub fn contact_lookup(&self, outcome: &str) {
        self.contact_lookups.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_labels() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.saml_callback("token_issued");
        metrics.saml_callback("missing_email");
        metrics.contact_lookup("error");

        let families = metrics.registry.gather();
        let callbacks = families
            .iter()
            .find(|family| family.get_name() == "saml_callbacks_total")
            .expect("callback counter registered");
        assert_eq!(callbacks.get_metric().len(), 2);
        assert!(metrics.render().is_ok());
    }
}
