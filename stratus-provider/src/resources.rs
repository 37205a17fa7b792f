//! Resource type definitions

use stratus_core::provider::ResourceType;

/// Name of the only resource type this provider manages
pub const INSTANCE_TYPE: &str = "instance";

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, [$($required:expr),* $(,)?]) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn required_attributes(&self) -> &'static [&'static str] {
                &[$($required),*]
            }
        }
    };
}

define_resource_type!(
    InstanceResourceType,
    INSTANCE_TYPE,
    ["group", "cloud", "instance_type", "layout", "plan"]
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(InstanceResourceType)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::provider::check_required_attributes;
    use stratus_core::resource::{Resource, Value};

    #[test]
    fn test_instance_requires_placement_tokens() {
        let resource = Resource::new("instance", "web")
            .with_attribute("group", Value::String("prod".into()))
            .with_attribute("cloud", Value::Int(2));
        let missing = check_required_attributes(&InstanceResourceType, &resource).unwrap_err();
        assert_eq!(missing.len(), 3);
        assert_eq!(
            missing[0],
            "instance.web: missing required attribute `instance_type`"
        );
    }

    #[test]
    fn test_resource_types() {
        let names: Vec<_> = resource_types().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["instance"]);
    }
}
