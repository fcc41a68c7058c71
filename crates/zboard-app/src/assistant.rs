//! Ollama 绘图助手

use serde::{Deserialize, Serialize};
use std::time::Duration;
use zboard_core::config::AssistantSettings;
use zboard_core::error::{BoardError, BoardResult};
use zboard_core::session::Assistant;

const SYSTEM_PROMPT: &str = r##"你是几何画板的绘图助手。根据用户需求输出 JSON 绘图指令数组，放在 ```json 代码块中。

可用指令：
- point: 点 {name, x, y, color}
- line: 线段 {name, start_point, end_point, color}
- fixed_length_line: 固定长度线段 {name, start_point, end_point, length}
- fixed_angle: 固定角度 {name, vertex, point1, point2, angle}
- fixed_point: 固定点 {point}
- midpoint: 中点 {point_name, line_name}
- triangle / polygon: 由已有点构成 {name, points}
- hand_in_hand: 手拉手模型 {center_x, center_y, r1, r2, alpha, beta, theta}

命名：点用单个大写字母，线段用 L1、L2…，角用 A1、A2…。重名时画板会自动改名。

手拉手模型：中心 O，等腰三角形 OAB 与 OCD 腰长不同，顶角固定，
连接 AC 与 BD。先建点，再建线段与固定角，最后固定 O 与 A。示例：
```json
[
    {"type": "point", "name": "O", "x": 400, "y": 300, "color": "#FF0000"},
    {"type": "point", "name": "A", "x": 240, "y": 220, "color": "#0000FF"},
    {"type": "point", "name": "B", "x": 560, "y": 220, "color": "#0000FF"},
    {"type": "point", "name": "C", "x": 280, "y": 460, "color": "#00FF00"},
    {"type": "point", "name": "D", "x": 520, "y": 460, "color": "#00FF00"},
    {"type": "fixed_length_line", "name": "L1", "start_point": "O", "end_point": "A", "length": 160},
    {"type": "fixed_length_line", "name": "L2", "start_point": "O", "end_point": "B", "length": 160},
    {"type": "fixed_length_line", "name": "L3", "start_point": "O", "end_point": "C", "length": 240},
    {"type": "fixed_length_line", "name": "L4", "start_point": "O", "end_point": "D", "length": 240},
    {"type": "line", "name": "L5", "start_point": "A", "end_point": "B"},
    {"type": "line", "name": "L6", "start_point": "C", "end_point": "D"},
    {"type": "line", "name": "L7", "start_point": "A", "end_point": "C", "color": "#FF0000"},
    {"type": "line", "name": "L8", "start_point": "B", "end_point": "D", "color": "#FF0000"},
    {"type": "fixed_angle", "name": "A1", "vertex": "O", "point1": "A", "point2": "B", "angle": 70},
    {"type": "fixed_angle", "name": "A2", "vertex": "O", "point1": "C", "point2": "D", "angle": 80},
    {"type": "fixed_point", "point": "O"},
    {"type": "fixed_point", "point": "A"}
]
```
"##;

/// 拼接系统提示、画布描述与用户需求
pub fn build_prompt(input: &str, context: &str) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    if !context.trim().is_empty() {
        prompt.push('\n');
        prompt.push_str(context.trim_end());
        prompt.push_str("\n\n");
    }
    prompt.push_str("用户需求：");
    prompt.push_str(input);
    prompt
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// Ollama 聊天接口客户端
pub struct OllamaClient {
    endpoint: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaClient {
    pub fn new(settings: &AssistantSettings) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(settings.timeout_secs)))
            .build()
            .into();
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            agent,
        }
    }

    /// 服务是否可用
    pub fn is_available(&self) -> bool {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(5)))
            .build()
            .into();
        match agent.get(&format!("{}/api/tags", self.endpoint)).call() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Ollama not reachable: {}", e);
                false
            }
        }
    }

    /// 发送一轮对话，返回回复文本
    pub fn chat(&self, prompt: &str) -> BoardResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };
        let url = format!("{}/api/chat", self.endpoint);
        tracing::info!("Asking {} at {}", self.model, url);

        let mut response = self
            .agent
            .post(&url)
            .send_json(&request)
            .map_err(|e| BoardError::Assistant(format!("request to {url} failed: {e}")))?;
        let body: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| BoardError::Assistant(format!("invalid response: {e}")))?;
        reply_text(body)
    }
}

fn reply_text(body: ChatResponse) -> BoardResult<String> {
    match body.message {
        Some(message) if !message.content.trim().is_empty() => Ok(message.content),
        _ => Err(BoardError::Assistant("empty reply".into())),
    }
}

impl Assistant for OllamaClient {
    fn complete(&self, prompt: &str, context: &str) -> BoardResult<String> {
        self.chat(&build_prompt(prompt, context))
    }
}
