use std::any::type_name;

use kube::Resource;

pub fn pretty_type_name<'a, T>() -> &'a str {
    type_name::<T>().split("::").last().unwrap_or_default()
}

pub trait AndIf<F> {
    fn and_if(self, condition: bool, then: F) -> Self;
}

impl<T, F> AndIf<F> for T
where
    F: FnOnce(Self) -> Self,
{
    fn and_if(self, condition: bool, then: F) -> Self {
        let mut obj = self;
        if condition {
            obj = then(obj);
        }

        obj
    }
}

/// Treats empty strings the same way as missing values.
pub trait NonEmpty {
    fn non_empty(&self) -> Option<&str>;
}

impl NonEmpty for Option<String> {
    fn non_empty(&self) -> Option<&str> {
        self.as_deref().filter(|value| !value.is_empty())
    }
}

impl NonEmpty for String {
    fn non_empty(&self) -> Option<&str> {
        Some(self.as_str()).filter(|value| !value.is_empty())
    }
}

pub trait RequireMetadata<E> {
    fn require_name_or(&self, error: E) -> Result<&str, E>;
}

impl<T: Resource, E> RequireMetadata<E> for T {
    fn require_name_or(&self, error: E) -> Result<&str, E> {
        Ok(self.meta().name.as_ref().ok_or(error)?.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{AndIf, NonEmpty};

    #[test]
    fn empty_strings_are_treated_as_missing() {
        assert_eq!(Some(String::new()).non_empty(), None);
        assert_eq!(None::<String>.non_empty(), None);
        assert_eq!(Some("1.28.0".to_owned()).non_empty(), Some("1.28.0"));
        assert_eq!(String::new().non_empty(), None);
    }

    #[test]
    fn and_if_only_applies_when_condition_holds() {
        assert_eq!(1.and_if(true, |v| v + 1), 2);
        assert_eq!(1.and_if(false, |v| v + 1), 1);
    }
}
