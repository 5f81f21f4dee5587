//! Validation layer negotiation and the debug messenger
//!
//! Diagnostics are optional. A missing layer, an unresolved extension entry
//! point or a failed messenger creation is logged and the program carries on
//! without them.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, c_void, CStr};
use std::fmt;

/// Entry points the messenger needs from `VK_EXT_debug_utils`
const MESSENGER_ENTRY_POINTS: [&[u8]; 2] = [
    b"vkCreateDebugUtilsMessengerEXT\0",
    b"vkDestroyDebugUtilsMessengerEXT\0",
];

/// Severity of a validation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Verbose diagnostic output
    Diagnostic,
    /// Informational message
    Info,
    /// Not an error, but likely a bug
    Warning,
    /// Invalid usage that may crash
    Error,
}

impl Severity {
    /// Map raw severity flags to the highest severity present
    pub fn from_flags(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Info
        } else {
            Self::Diagnostic
        }
    }

    /// Short fixed-width tag used in log lines
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Diagnostic => "DIAG",
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERRR",
        }
    }

    /// Log level the message is forwarded at
    pub const fn level(self) -> log::Level {
        match self {
            Self::Diagnostic => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// Categories a validation message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageKinds {
    /// Unrelated to the specification or performance
    pub general: bool,
    /// Specification violation or likely mistake
    pub validation: bool,
    /// Potentially non-optimal API use
    pub performance: bool,
}

impl MessageKinds {
    /// Decode the raw type mask
    pub fn from_flags(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        Self {
            general: flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL),
            validation: flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            performance: flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
        }
    }
}

impl fmt::Display for MessageKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.general, "general"),
            (self.validation, "validation"),
            (self.performance, "performance"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        if names.is_empty() {
            f.write_str("unknown")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Extract layer names from enumerated layer properties
pub fn layer_names(properties: &[vk::LayerProperties]) -> Vec<String> {
    properties
        .iter()
        .map(|layer| {
            unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

/// Requested layers that are absent from the available list
pub fn missing_layers<'a>(requested: &'a [String], available: &[String]) -> Vec<&'a str> {
    requested
        .iter()
        .filter(|name| !available.contains(name))
        .map(String::as_str)
        .collect()
}

/// Check whether every requested layer can be enabled
///
/// Logs each missing layer. An enumeration failure is treated like a missing
/// layer: diagnostics are optional.
pub fn validation_layers_available(entry: &Entry, requested: &[String]) -> bool {
    let available = match entry.enumerate_instance_layer_properties() {
        Ok(properties) => layer_names(&properties),
        Err(e) => {
            log::warn!("Could not enumerate instance layers: {:?}", e);
            return false;
        }
    };

    let missing = missing_layers(requested, &available);
    for name in &missing {
        log::warn!("Validation layer {} not found", name);
    }
    missing.is_empty()
}

/// Messenger configuration shared by instance creation and registration
pub fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Forwards validation messages to the `log` facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let severity = Severity::from_flags(message_severity);
    let kinds = MessageKinds::from_flags(message_type);

    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy()
    };

    log::log!(severity.level(), "[{}] Validation layer ({}): {}", severity.tag(), kinds, message);

    vk::FALSE
}

/// Registered debug messenger with RAII cleanup
pub struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Register the messenger, or log why it could not be
    pub fn new(entry: &Entry, instance: &Instance) -> Option<Self> {
        let resolved = MESSENGER_ENTRY_POINTS.iter().all(|name| {
            unsafe { entry.get_instance_proc_addr(instance.handle(), name.as_ptr().cast::<c_char>()) }
                .is_some()
        });
        if !resolved {
            log::warn!("Failed to set up debug messenger: extension entry points not present");
            return None;
        }

        let loader = DebugUtils::new(entry, instance);
        let create_info = messenger_create_info();

        match unsafe { loader.create_debug_utils_messenger(&create_info, None) } {
            Ok(messenger) => {
                log::debug!("Debug messenger registered");
                Some(Self { loader, messenger })
            }
            Err(e) => {
                log::warn!("Failed to set up debug messenger: {:?}", e);
                None
            }
        }
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_missing_layers_reports_only_absent_names() {
        let requested = names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_api_dump"]);
        let available = names(&["VK_LAYER_MESA_device_select", "VK_LAYER_KHRONOS_validation"]);
        assert_eq!(missing_layers(&requested, &available), vec!["VK_LAYER_LUNARG_api_dump"]);
    }

    #[test]
    fn test_missing_layers_empty_when_all_present_or_none_requested() {
        let available = names(&["VK_LAYER_KHRONOS_validation"]);
        assert!(missing_layers(&available, &available).is_empty());
        assert!(missing_layers(&[], &available).is_empty());
        assert_eq!(missing_layers(&available, &[]).len(), 1);
    }

    #[test]
    fn test_layer_names_read_nul_terminated_names() {
        let mut layer = vk::LayerProperties::default();
        for (dst, src) in layer.layer_name.iter_mut().zip(b"VK_LAYER_test".iter()) {
            *dst = *src as c_char;
        }
        assert_eq!(layer_names(&[layer]), vec!["VK_LAYER_test".to_string()]);
    }

    #[test]
    fn test_severity_mapping() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as F;
        assert_eq!(Severity::from_flags(F::VERBOSE), Severity::Diagnostic);
        assert_eq!(Severity::from_flags(F::INFO), Severity::Info);
        assert_eq!(Severity::from_flags(F::WARNING), Severity::Warning);
        assert_eq!(Severity::from_flags(F::ERROR), Severity::Error);
        assert_eq!(Severity::from_flags(F::INFO | F::ERROR), Severity::Error);
        assert_eq!(Severity::Error.tag(), "ERRR");
        assert_eq!(Severity::Warning.level(), log::Level::Warn);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_message_kinds_display() {
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(MessageKinds::from_flags(T::VALIDATION).to_string(), "validation");
        assert_eq!(
            MessageKinds::from_flags(T::GENERAL | T::PERFORMANCE).to_string(),
            "general|performance"
        );
        assert_eq!(MessageKinds::from_flags(T::empty()).to_string(), "unknown");
    }

    #[test]
    fn test_callback_forwards_and_never_aborts() {
        let message = b"test message\0";
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: message.as_ptr().cast::<c_char>(),
            ..Default::default()
        };
        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);

        let null_result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(null_result, vk::FALSE);
    }

    #[test]
    fn test_create_info_covers_all_severities_and_kinds() {
        let info = messenger_create_info();
        assert!(info.message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(info.message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info.message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE));
        assert!(info.pfn_user_callback.is_some());
    }
}
