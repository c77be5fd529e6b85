//! Helpers for building registry resource identifiers and routes.

use crate::error::{Error, Result};

/// Characters the registry replaces with `-` when forming resource ids.
const ID_UNSAFE_CHARS: &[char] = &['$', '!', '*', ',', ';', '/', '?', '@', '&', '~', '=', '%'];

/// `"/" + id`, or empty when `id` is empty. Handy when the id ends a route.
pub fn add_slash(id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    format!("/{id}")
}

/// Split an optional `org/` prefix off `id`.
///
/// An org embedded in the id overrides `org`. More than one `/` is an input
/// error.
pub fn trim_org<'a>(org: &'a str, id: &'a str) -> Result<(&'a str, &'a str)> {
    let mut parts = id.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(embedded_org), Some(bare_id), None) => Ok((embedded_org, bare_id)),
        (_, None, _) => Ok((org, id)),
        _ => Err(Error::Input(
            "the resource id can not contain more than 1 '/'".to_string(),
        )),
    }
}

/// Replace characters that are unsafe in registry ids with `-`.
pub fn form_exchange_id(id: &str) -> String {
    id.replace(ID_UNSAFE_CHARS, "-")
}

/// Strip a leading `scheme://`, then apply [`form_exchange_id`].
pub fn form_exchange_id_with_spec_ref(spec_ref: &str) -> String {
    form_exchange_id(strip_scheme(spec_ref))
}

/// The id the registry derives for a service: `<ref>_<version>_<arch>`.
pub fn form_exchange_id_for_service(url: &str, version: &str, arch: &str) -> String {
    format!("{}_{version}_{arch}", form_exchange_id_with_spec_ref(url))
}

fn strip_scheme(spec_ref: &str) -> &str {
    match spec_ref.find("://") {
        Some(pos)
            if spec_ref[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')) =>
        {
            &spec_ref[pos + 3..]
        }
        _ => spec_ref,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_slash_skips_empty() {
        assert_eq!(add_slash(""), "");
        assert_eq!(add_slash("svc1"), "/svc1");
    }

    #[test]
    fn trim_org_cases() {
        assert_eq!(trim_org("myorg", "svc").unwrap(), ("myorg", "svc"));
        assert_eq!(trim_org("myorg", "").unwrap(), ("myorg", ""));
        assert_eq!(trim_org("myorg", "other/svc").unwrap(), ("other", "svc"));
        assert!(matches!(trim_org("myorg", "a/b/c"), Err(Error::Input(_))));
    }

    #[test]
    fn exchange_id_replaces_unsafe_chars() {
        assert_eq!(form_exchange_id("a/b?c=d&e"), "a-b-c-d-e");
        assert_eq!(form_exchange_id("plain_id.1"), "plain_id.1");
    }

    #[test]
    fn exchange_id_for_service_strips_scheme() {
        assert_eq!(
            form_exchange_id_for_service("https://bluehorizon.network/services/netspeed", "2.3.0", "amd64"),
            "bluehorizon.network-services-netspeed_2.3.0_amd64"
        );
        assert_eq!(form_exchange_id_with_spec_ref("my.company.com.gps"), "my.company.com.gps");
    }

    #[test]
    fn scheme_must_be_well_formed() {
        assert_eq!(form_exchange_id_with_spec_ref("a b://x"), "a b:--x");
    }
}
