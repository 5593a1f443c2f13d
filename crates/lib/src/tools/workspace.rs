//! Built-in Google Workspace tools: send_email, create_sheet, append_to_sheet, share_file_via_email.

use crate::google::ServiceHandles;
use crate::tools::{normalize_rows, ToolDefinition, ToolError, ToolRegistry};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailInput {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSheetInput {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendSheetInput {
    pub spreadsheet_id: String,
    pub range: String,
    pub values: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareFileInput {
    pub file_id: String,
    pub email: String,
}

fn definition(name: &str, description: &str, properties: serde_json::Value) -> ToolDefinition {
    let required: Vec<String> = properties
        .as_object()
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "required": required,
            "properties": properties,
        }),
    }
}

fn string_prop(description: &str) -> serde_json::Value {
    serde_json::json!({ "type": "string", "description": description })
}

/// Register the four workspace tools over the given service handles.
pub fn register_workspace_tools(registry: &mut ToolRegistry, handles: &ServiceHandles) {
    let mail = handles.mail.clone();
    registry.register(
        definition(
            "send_email",
            "Send an email using Gmail.",
            serde_json::json!({
                "to": string_prop("Recipient email address"),
                "subject": string_prop("Subject line"),
                "body": string_prop("Plain-text body"),
            }),
        ),
        move |input: EmailInput| {
            let mail = mail.clone();
            async move {
                let id = mail
                    .send_email(&input.to, &input.subject, &input.body)
                    .await
                    .map_err(|source| ToolError::Remote {
                        action: "send email",
                        source,
                    })?;
                Ok(format!("Email sent with ID: {}", id))
            }
        },
    );

    let sheets = handles.sheets.clone();
    registry.register(
        definition(
            "create_sheet",
            "Create a new Google Sheet and return its spreadsheet id.",
            serde_json::json!({ "title": string_prop("Spreadsheet title") }),
        ),
        move |input: CreateSheetInput| {
            let sheets = sheets.clone();
            async move {
                let id = sheets
                    .create_spreadsheet(&input.title)
                    .await
                    .map_err(|source| ToolError::Remote {
                        action: "create sheet",
                        source,
                    })?;
                Ok(format!("Spreadsheet created: {}", id))
            }
        },
    );

    let sheets = handles.sheets.clone();
    registry.register(
        definition(
            "append_to_sheet",
            "Append rows to a Google Sheet. A single cell holding a pipe-separated table is split into rows.",
            serde_json::json!({
                "spreadsheet_id": string_prop("Spreadsheet id"),
                "range": string_prop("A1 range, e.g. Sheet1!A1"),
                "values": {
                    "type": "array",
                    "description": "Rows of string cells",
                    "items": { "type": "array", "items": { "type": "string" } }
                },
            }),
        ),
        move |input: AppendSheetInput| {
            let sheets = sheets.clone();
            async move {
                let rows = normalize_rows(input.values);
                sheets
                    .append_values(&input.spreadsheet_id, &input.range, &rows)
                    .await
                    .map_err(|source| ToolError::Remote {
                        action: "append to sheet",
                        source,
                    })?;
                Ok("Data appended successfully.".to_string())
            }
        },
    );

    let drive = handles.drive.clone();
    registry.register(
        definition(
            "share_file_via_email",
            "Share a Drive file with a user (writer access, notification email).",
            serde_json::json!({
                "file_id": string_prop("Drive file or spreadsheet id"),
                "email": string_prop("Email address to share with"),
            }),
        ),
        move |input: ShareFileInput| {
            let drive = drive.clone();
            async move {
                drive
                    .share_with_user(&input.file_id, &input.email)
                    .await
                    .map_err(|source| ToolError::Remote {
                        action: "share file",
                        source,
                    })?;
                Ok(format!("File shared with {}", input.email))
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::{DriveService, GoogleError, MailService, SheetsService};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeWorkspace {
        fail: bool,
        appended: Mutex<Vec<Vec<Vec<String>>>>,
        sent: Mutex<Vec<String>>,
    }

    impl FakeWorkspace {
        fn error() -> GoogleError {
            GoogleError::Api {
                status: 403,
                message: "Insufficient Permission".to_string(),
            }
        }
    }

    #[async_trait]
    impl MailService for FakeWorkspace {
        async fn send_email(&self, to: &str, _: &str, _: &str) -> Result<String, GoogleError> {
            if self.fail {
                return Err(Self::error());
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok("msg-1".to_string())
        }
    }

    #[async_trait]
    impl SheetsService for FakeWorkspace {
        async fn create_spreadsheet(&self, _: &str) -> Result<String, GoogleError> {
            if self.fail {
                return Err(Self::error());
            }
            Ok("sheet-1".to_string())
        }

        async fn append_values(
            &self,
            _: &str,
            _: &str,
            values: &[Vec<String>],
        ) -> Result<(), GoogleError> {
            if self.fail {
                return Err(Self::error());
            }
            self.appended.lock().unwrap().push(values.to_vec());
            Ok(())
        }
    }

    #[async_trait]
    impl DriveService for FakeWorkspace {
        async fn share_with_user(&self, _: &str, _: &str) -> Result<(), GoogleError> {
            if self.fail {
                return Err(Self::error());
            }
            Ok(())
        }
    }

    fn registry(fake: Arc<FakeWorkspace>) -> ToolRegistry {
        let handles = ServiceHandles {
            mail: fake.clone(),
            sheets: fake.clone(),
            drive: fake,
        };
        let mut registry = ToolRegistry::new();
        register_workspace_tools(&mut registry, &handles);
        registry
    }

    #[tokio::test]
    async fn success_texts_include_identifiers() {
        let registry = registry(Arc::new(FakeWorkspace::default()));
        let sent = registry
            .invoke(
                "send_email",
                serde_json::json!({ "to": "a@b.c", "subject": "s", "body": "b" }),
            )
            .await;
        assert_eq!(sent.text, "Email sent with ID: msg-1");
        let created = registry.invoke("create_sheet", serde_json::json!({ "title": "T" })).await;
        assert_eq!(created.text, "Spreadsheet created: sheet-1");
        let shared = registry
            .invoke(
                "share_file_via_email",
                serde_json::json!({ "file_id": "f", "email": "a@b.c" }),
            )
            .await;
        assert_eq!(shared.text, "File shared with a@b.c");
    }

    #[tokio::test]
    async fn send_email_remote_failure() {
        let fake = Arc::new(FakeWorkspace {
            fail: true,
            ..Default::default()
        });
        let registry = registry(fake);
        let result = registry
            .invoke(
                "send_email",
                serde_json::json!({ "to": "a@b.c", "subject": "s", "body": "b" }),
            )
            .await;
        assert!(!result.success);
        assert!(result.text.starts_with("Failed to send email"), "{}", result.text);
        assert!(result.text.contains("Insufficient Permission"));
    }

    #[tokio::test]
    async fn malformed_email_never_sends() {
        let fake = Arc::new(FakeWorkspace::default());
        let registry = registry(fake.clone());
        let result = registry
            .invoke("send_email", serde_json::json!({ "to": "a@b.c", "subject": "s" }))
            .await;
        assert!(!result.success);
        assert!(fake.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_reformats_table_cell() {
        let fake = Arc::new(FakeWorkspace::default());
        let registry = registry(fake.clone());
        let result = registry
            .invoke(
                "append_to_sheet",
                serde_json::json!({
                    "spreadsheet_id": "sheet-1",
                    "range": "Sheet1!A1",
                    "values": [["Position | Driver | Nationality | Team | Points\n1 | Lando Norris NOR | British | McLaren | 374 PTS"]]
                }),
            )
            .await;
        assert_eq!(result, crate::tools::ToolResult::ok("Data appended successfully."));
        let appended = fake.appended.lock().unwrap();
        assert_eq!(
            appended[0],
            vec![
                vec!["Position", "Driver", "Nationality", "Team", "Points"],
                vec!["1", "Lando Norris", "British", "McLaren", "374"],
            ]
        );
    }

    #[test]
    fn definitions_require_every_field() {
        let registry = registry(Arc::new(FakeWorkspace::default()));
        let defs = registry.definitions();
        let append = defs.iter().find(|d| d.name == "append_to_sheet").unwrap();
        assert_eq!(
            append.parameters["required"],
            serde_json::json!(["spreadsheet_id", "range", "values"])
        );
        assert_eq!(defs.len(), 4);
    }
}
