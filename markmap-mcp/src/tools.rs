//! MCP tools for markmap-mcp
//!
//! [`ToolContext`] holds the configured clients and implements each tool as a
//! plain async method returning `Result<String, ToolFailure>`; [`MarkmapServer`]
//! exposes those methods through the rmcp tool router.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use markmap_core::contract::{Expander, Fetcher, ObjectStore, Viewer};
use markmap_core::outline::markdown_to_freemind;
use markmap_core::publish::{publish, PublishError, PublishRequest};

const MAX_FILE_STEM_CHARS: usize = 50;

/// Shared, read-only state behind every tool call.
pub struct ToolContext {
    pub output_dir: PathBuf,
    pub primary: Option<Arc<dyn ObjectStore>>,
    pub secondary: Option<Arc<dyn ObjectStore>>,
    pub expander: Option<Arc<dyn Expander>>,
    pub fetcher: Arc<dyn Fetcher>,
    pub viewer: Arc<dyn Viewer>,
}

/// Error payload returned to the client as `{"error": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub error: String,
    pub message: String,
}

impl ToolFailure {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.error, "message": self.message }).to_string()
    }
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct MarkdownToMindmapRequest {
    /// Markdown content to render. Mutually exclusive with `url`.
    pub markdown: Option<String>,
    /// http(s) URL of a Markdown document to render. Mutually exclusive with `markdown`.
    pub url: Option<String>,
    /// Open the generated file in the default browser when it was not uploaded.
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TextToMindmapRequest {
    /// The text description to convert into a mind map
    pub text: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MarkdownToOutlineRequest {
    /// Markdown content to convert
    pub markdown: String,
}

/// Successful `text_to_mindmap` payload.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TextToMindmapResponse {
    pub success: bool,
    pub download_url: String,
    pub preview_url: String,
    pub filename: String,
    pub timestamp: String,
    pub message: String,
}

/// File stem derived from free text: CJK ideographs, ASCII letters, digits
/// and whitespace survive, whitespace runs become `-`, at most 50 characters.
pub fn sanitize_file_stem(text: &str) -> String {
    static DISALLOWED: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let disallowed = DISALLOWED
        .get_or_init(|| Regex::new(r"[^\x{4e00}-\x{9fa5}a-zA-Z0-9\s]").expect("static pattern"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));

    let kept = disallowed.replace_all(text, "");
    let dashed = whitespace.replace_all(&kept, "-");
    let stem: String = dashed.chars().take(MAX_FILE_STEM_CHARS).collect();
    if stem.is_empty() {
        "mindmap".to_string()
    } else {
        stem
    }
}

impl ToolContext {
    /// Render Markdown given inline or by URL; returns the primary URL or the local path.
    pub async fn markdown_to_mindmap(
        &self,
        request: MarkdownToMindmapRequest,
    ) -> Result<String, ToolFailure> {
        let markdown = match (request.markdown, request.url) {
            (Some(markdown), None) => markdown,
            (None, Some(url)) => self.fetcher.fetch_text(&url).await.map_err(|e| {
                error!(%url, error = %e, "Failed to fetch Markdown");
                ToolFailure::new("Failed to fetch Markdown", e.to_string())
            })?,
            _ => {
                return Err(ToolFailure::new(
                    "Invalid arguments",
                    "Provide exactly one of `markdown` or `url`",
                ))
            }
        };

        let output_path = self
            .output_dir
            .join(format!("markmap-{}.html", Uuid::new_v4()));
        let result = publish(
            PublishRequest {
                content: &markdown,
                output_path: Some(output_path),
                open_locally: request.open,
                force_remote_upload: false,
                primary_store: self.primary.as_deref(),
                secondary_store: self.secondary.as_deref(),
            },
            &self.output_dir,
            self.viewer.as_ref(),
        )
        .await
        .map_err(|e| ToolFailure::new("Failed to generate mind map", e.to_string()))?;

        info!(location = %result.local_path, "Mind map ready");
        Ok(result.local_path)
    }

    /// Expand text with the model, then publish with forced upload.
    pub async fn text_to_mindmap(&self, request: TextToMindmapRequest) -> Result<String, ToolFailure> {
        let Some(expander) = self.expander.as_deref() else {
            return Err(ToolFailure::new(
                "Qwen API not configured",
                "Set QWEN_API_KEY or DASHSCOPE_API_KEY to enable text expansion",
            ));
        };
        let Some(primary) = self.primary.as_deref() else {
            return Err(ToolFailure::new(
                "OSS not configured",
                "Set OSS_ACCESS_KEY_ID, OSS_ACCESS_KEY_SECRET and OSS_BUCKET to enable cloud storage",
            ));
        };

        let preview: String = request.text.chars().take(100).collect();
        info!(input = %preview, "Expanding text into Markdown");
        let markdown = expander.expand(&request.text).await.map_err(|e| {
            error!(error = %e, "Text expansion failed");
            ToolFailure::new("Failed to generate mind map", e.to_string())
        })?;

        let filename = format!(
            "{}-{}-{}.html",
            sanitize_file_stem(&request.text),
            Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let result = publish(
            PublishRequest {
                content: &markdown,
                output_path: Some(self.output_dir.join(&filename)),
                open_locally: false,
                force_remote_upload: true,
                primary_store: Some(primary),
                secondary_store: self.secondary.as_deref(),
            },
            &self.output_dir,
            self.viewer.as_ref(),
        )
        .await
        .map_err(|e| match e {
            PublishError::Upload(msg) => ToolFailure::new("OSS upload failed", msg),
            other => ToolFailure::new("Failed to generate mind map", other.to_string()),
        })?;

        let Some(download_url) = result.primary_url else {
            return Err(ToolFailure::new(
                "OSS upload failed",
                "The mind map was generated but not uploaded",
            ));
        };
        let preview_url = match result.secondary_url {
            Some(url) => url,
            None => {
                warn!("Secondary upload unavailable, using the primary link for preview");
                download_url.clone()
            }
        };
        let storage = if result.uploaded_to_secondary {
            "OSS + MinIO"
        } else {
            "OSS only"
        };

        let response = TextToMindmapResponse {
            success: true,
            message: format!(
                "Mind map generated ({storage}).\n\nDownload:\n{download_url}\n\nPreview:\n{preview_url}\n\nFile: {filename}"
            ),
            download_url,
            preview_url,
            filename,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        info!(url = %response.download_url, "Text mind map published");
        serde_json::to_string_pretty(&response)
            .map_err(|e| ToolFailure::new("Failed to encode response", e.to_string()))
    }

    pub fn markdown_to_outline(&self, request: MarkdownToOutlineRequest) -> Result<String, ToolFailure> {
        Ok(markdown_to_freemind(&request.markdown))
    }
}

fn into_call_result(outcome: Result<String, ToolFailure>) -> CallToolResult {
    match outcome {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(failure) => {
            warn!(error = %failure.error, message = %failure.message, "Tool call failed");
            CallToolResult::error(vec![Content::text(failure.to_json())])
        }
    }
}

/// markmap MCP service
#[derive(Clone)]
pub struct MarkmapServer {
    context: Arc<ToolContext>,
    tool_router: ToolRouter<Self>,
}

impl MarkmapServer {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context: Arc::new(context),
            tool_router: Self::tool_router(),
        }
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }
}

#[tool_handler]
impl ServerHandler for MarkmapServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("markmap-mcp turns Markdown or free text into interactive mind maps. Use 'markdown_to_mindmap' for existing Markdown (inline or by URL), 'text_to_mindmap' to have the model draft the Markdown and publish it to cloud storage, and 'markdown_to_outline' for a FreeMind .mm export.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl MarkmapServer {
    #[tool(description = "Convert Markdown into an interactive mind map. Pass either inline `markdown` or a `url` to fetch it from. Returns the uploaded URL when object storage is configured, otherwise the local file path.")]
    pub async fn markdown_to_mindmap(
        &self,
        Parameters(request): Parameters<MarkdownToMindmapRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(into_call_result(
            self.context.markdown_to_mindmap(request).await,
        ))
    }

    #[tool(description = "Convert a text description into an interactive mind map using AI. The text is expanded into Markdown by the Qwen model, rendered, and uploaded to OSS (and MinIO when configured).")]
    pub async fn text_to_mindmap(
        &self,
        Parameters(request): Parameters<TextToMindmapRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(into_call_result(self.context.text_to_mindmap(request).await))
    }

    #[tool(description = "Convert Markdown headings and lists into a FreeMind .mm document (opens in XMind and FreeMind).")]
    pub async fn markdown_to_outline(
        &self,
        Parameters(request): Parameters<MarkdownToOutlineRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(into_call_result(self.context.markdown_to_outline(request)))
    }
}
