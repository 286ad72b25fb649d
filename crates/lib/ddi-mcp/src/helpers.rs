use std::borrow::Cow;

use ddi_core::control::ControlError;
use ddi_core::invoke::InvokeError;
use ddi_core::knowledge::KnowledgeError;
use ddi_core::remote::RemoteError;
use rmcp::ErrorData;
use rmcp::model::ErrorCode;

pub fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Maps a control-plane failure onto the closest MCP error code.
pub fn map_err(err: ControlError) -> ErrorData {
    let code = match &err {
        ControlError::NotFound(_)
        | ControlError::Invoke(InvokeError::UnknownHandler(_) | InvokeError::Remote(RemoteError::NotFound(_))) => {
            ErrorCode::RESOURCE_NOT_FOUND
        }
        ControlError::InvalidInput(_)
        | ControlError::Invoke(
            InvokeError::MissingArgument(_)
            | InvokeError::InvalidArgument { .. }
            | InvokeError::Validation(_),
        ) => ErrorCode::INVALID_PARAMS,
        ControlError::Knowledge(KnowledgeError::EmptySnapshot) => ErrorCode::INVALID_REQUEST,
        ControlError::Refresh(_) | ControlError::Invoke(InvokeError::Remote(_)) | ControlError::Knowledge(_) => {
            ErrorCode::INTERNAL_ERROR
        }
    };
    mcp_err(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_errors_map_to_mcp_codes() {
        let unknown = map_err(ControlError::Invoke(InvokeError::UnknownHandler("List:vlan".to_string())));
        assert_eq!(unknown.code, ErrorCode::RESOURCE_NOT_FOUND);
        assert!(unknown.message.contains("List:vlan"));

        let missing = map_err(ControlError::Invoke(InvokeError::MissingArgument("filters")));
        assert_eq!(missing.code, ErrorCode::INVALID_PARAMS);

        let remote = map_err(ControlError::Invoke(InvokeError::Remote(RemoteError::Timeout)));
        assert_eq!(remote.code, ErrorCode::INTERNAL_ERROR);

        let empty = map_err(ControlError::Knowledge(KnowledgeError::EmptySnapshot));
        assert_eq!(empty.code, ErrorCode::INVALID_REQUEST);
    }
}
