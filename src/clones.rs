//! Clone Personas
//!
//! Each clone is a named specialization of the assistant bound to a
//! prompt/strategy that lives outside this gateway. The real generation
//! backend is an external capability; the shipped responder is a stub.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clone categories a message can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneKind {
    Ads,
    Ceo,
    Content,
    Voice,
    Funnel,
    Calendar,
}

impl CloneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloneKind::Ads => "ads",
            CloneKind::Ceo => "ceo",
            CloneKind::Content => "content",
            CloneKind::Voice => "voice",
            CloneKind::Funnel => "funnel",
            CloneKind::Calendar => "calendar",
        }
    }

    /// Parse a stored category tag. Unknown tags fall back to the
    /// default clone so old rows stay readable.
    pub fn parse(s: &str) -> Self {
        match s {
            "ads" => CloneKind::Ads,
            "ceo" => CloneKind::Ceo,
            "voice" => CloneKind::Voice,
            "funnel" => CloneKind::Funnel,
            "calendar" => CloneKind::Calendar,
            _ => CloneKind::Content,
        }
    }

    /// Display name used in replies
    pub fn title(&self) -> &'static str {
        match self {
            CloneKind::Ads => "Genia Ads",
            CloneKind::Ceo => "Genia CEO",
            CloneKind::Content => "Genia Content",
            CloneKind::Voice => "Genia Voice",
            CloneKind::Funnel => "Genia Funnel",
            CloneKind::Calendar => "Genia Calendar",
        }
    }
}

impl fmt::Display for CloneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response synthesis seam - the actual AI generation behind each clone
#[async_trait]
pub trait CloneResponder: Send + Sync {
    /// Produce a reply for the given clone and user message
    async fn respond(&self, clone: CloneKind, text: &str) -> Result<String>;
}

/// Canned responder standing in for the generation backend
pub struct StubResponder;

#[async_trait]
impl CloneResponder for StubResponder {
    async fn respond(&self, clone: CloneKind, _text: &str) -> Result<String> {
        let body = match clone {
            CloneKind::Ads => {
                "Puedo ayudarte a crear anuncios que conviertan. Cuéntame sobre tu producto y tu audiencia."
            }
            CloneKind::Ceo => {
                "Hablemos de estrategia. ¿Cuál es el mayor reto de tu negocio en este momento?"
            }
            CloneKind::Content => {
                "Estoy aquí para ayudarte con tu contenido. ¿Sobre qué tema quieres trabajar hoy?"
            }
            CloneKind::Voice => {
                "Trabajemos tu comunicación. ¿Qué presentación o discurso quieres preparar?"
            }
            CloneKind::Funnel => {
                "Optimicemos tu embudo de ventas. ¿En qué etapa pierdes más clientes?"
            }
            CloneKind::Calendar => {
                "Organicemos tu agenda. ¿Qué quieres priorizar esta semana?"
            }
        };
        Ok(format!("[{}] {}", clone.title(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_tags() {
        for clone in [
            CloneKind::Ads,
            CloneKind::Ceo,
            CloneKind::Content,
            CloneKind::Voice,
            CloneKind::Funnel,
            CloneKind::Calendar,
        ] {
            assert_eq!(CloneKind::parse(clone.as_str()), clone);
        }
    }

    #[test]
    fn test_unknown_tag_defaults_to_content() {
        assert_eq!(CloneKind::parse("nonsense"), CloneKind::Content);
    }

    #[tokio::test]
    async fn test_stub_responder_mentions_clone() {
        let responder = StubResponder;
        let reply = responder.respond(CloneKind::Ads, "hola").await.unwrap();
        assert!(reply.contains("Genia Ads"));
    }
}
