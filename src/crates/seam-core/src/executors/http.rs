//! Outbound HTTP node

use super::expect_data;
use crate::expr::Template;
use crate::http::{HttpFacade, HttpRequest};
use seam_node::context::ExecutionContext;
use seam_node::error::Result;
use seam_node::executor::NodeExecutor;
use seam_node::node::{NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// `http` - performs one request through the facade. URL, header values,
/// and string bodies may carry `{{ expression }}` template segments, which
/// are rendered against the execution scope just before the request.
pub struct HttpExecutor {
    facade: Arc<HttpFacade>,
}

impl HttpExecutor {
    pub fn new(facade: Arc<HttpFacade>) -> Self {
        Self { facade }
    }
}

#[async_trait]
impl NodeExecutor for HttpExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Http
    }

    fn validate(&self, node: &ValidatedNode) -> Result<()> {
        if let seam_node::node::NodeData::Http(data) = &node.data {
            // template syntax errors surface before execution
            Template::compile(&data.url, 64)?;
            if let Some(headers) = &data.headers {
                for value in headers.values() {
                    Template::compile(value, 64)?;
                }
            }
            if let Some(Value::String(body)) = &data.body {
                Template::compile(body, 64)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Http);

        let url = render_if_templated(ctx, &data.url).await?;
        let method = data
            .method
            .clone()
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase();

        let mut headers = Vec::new();
        if let Some(declared) = &data.headers {
            for (name, value) in declared {
                headers.push((name.clone(), render_if_templated(ctx, value).await?));
            }
        }

        let body = match &data.body {
            Some(Value::String(text)) => {
                Some(Value::String(render_if_templated(ctx, text).await?))
            }
            other => other.clone(),
        };

        let request = HttpRequest {
            url,
            method,
            headers,
            body,
        };
        let response = self
            .facade
            .fetch(&request, ctx.resources(), &ctx.cancellation())
            .await?;

        Ok(json!({
            "status": response.status,
            "headers": response.headers,
            "body": response.body,
        }))
    }
}

async fn render_if_templated(ctx: &dyn ExecutionContext, text: &str) -> Result<String> {
    if Template::is_templated(text) {
        ctx.render_template(text).await
    } else {
        Ok(text.to_string())
    }
}
