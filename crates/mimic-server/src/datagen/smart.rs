//! Semantic field categories and their realistic renderers.

use chrono::{DateTime as ChronoDateTime, Utc};
use fake::faker::address::en::{BuildingNumber, StreetName};
use fake::faker::chrono::en::DateTime;
use fake::faker::internet::en::{DomainSuffix, SafeEmail, IPv4, IPv6};
use fake::faker::lorem::en::Word;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::uuid::UUIDv4;
use fake::Fake;
use rand::rngs::StdRng;

/// Categories a string leaf can be recognized as, by field name or by the
/// schema's declared `format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartField {
    Email,
    Name,
    FirstName,
    LastName,
    Phone,
    Address,
    Url,
    Uuid,
    Id,
    Date,
    DateTime,
    Ipv4,
    Ipv6,
}

impl SmartField {
    /// Match a field name against the known categories. Substring checks,
    /// first hit wins; ordering matters (`uuid` ends in `id`, so the id
    /// check also claims it — both render a UUID anyway).
    pub fn from_field_name(name: Option<&str>) -> Option<Self> {
        let lower = name?.to_lowercase();
        if lower.contains("email") {
            Some(SmartField::Email)
        } else if lower == "id" || lower.ends_with("id") || lower.contains("_id") {
            Some(SmartField::Id)
        } else if lower.contains("uuid") {
            Some(SmartField::Uuid)
        } else if lower.contains("first") && lower.contains("name") {
            Some(SmartField::FirstName)
        } else if lower.contains("last") && lower.contains("name") {
            Some(SmartField::LastName)
        } else if lower.contains("name") {
            Some(SmartField::Name)
        } else if lower.contains("phone") || lower.contains("mobile") {
            Some(SmartField::Phone)
        } else if lower.contains("address") {
            Some(SmartField::Address)
        } else if lower.contains("url") || lower.contains("uri") || lower.contains("link") {
            Some(SmartField::Url)
        } else if lower.contains("date") {
            Some(SmartField::Date)
        } else if lower.contains("ip") {
            Some(SmartField::Ipv4)
        } else {
            None
        }
    }

    /// Match a declared schema `format`.
    pub fn from_format(format: Option<&str>) -> Option<Self> {
        match format?.to_lowercase().as_str() {
            "email" => Some(SmartField::Email),
            "uuid" => Some(SmartField::Uuid),
            "date" | "date-time" => Some(SmartField::DateTime),
            "uri" | "url" => Some(SmartField::Url),
            "ipv4" => Some(SmartField::Ipv4),
            "ipv6" => Some(SmartField::Ipv6),
            _ => None,
        }
    }

    pub fn render(self, rng: &mut StdRng) -> String {
        match self {
            SmartField::Email => SafeEmail().fake_with_rng(rng),
            SmartField::Name => Name().fake_with_rng(rng),
            SmartField::FirstName => FirstName().fake_with_rng(rng),
            SmartField::LastName => LastName().fake_with_rng(rng),
            SmartField::Phone => PhoneNumber().fake_with_rng(rng),
            SmartField::Address => {
                let number: String = BuildingNumber().fake_with_rng(rng);
                let street: String = StreetName().fake_with_rng(rng);
                format!("{number} {street}")
            }
            SmartField::Url => {
                let host: String = Word().fake_with_rng(rng);
                let suffix: String = DomainSuffix().fake_with_rng(rng);
                format!("https://www.{host}.{suffix}")
            }
            SmartField::Uuid | SmartField::Id => {
                let id: uuid::Uuid = UUIDv4.fake_with_rng(rng);
                id.to_string()
            }
            SmartField::Date | SmartField::DateTime => {
                let timestamp: ChronoDateTime<Utc> = DateTime().fake_with_rng(rng);
                timestamp.to_rfc3339()
            }
            SmartField::Ipv4 => IPv4().fake_with_rng(rng),
            SmartField::Ipv6 => IPv6().fake_with_rng(rng),
        }
    }
}

pub fn lorem_word(rng: &mut StdRng) -> String {
    Word().fake_with_rng(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_field_name_matching() {
        assert_eq!(
            SmartField::from_field_name(Some("contactEmail")),
            Some(SmartField::Email)
        );
        assert_eq!(
            SmartField::from_field_name(Some("userId")),
            Some(SmartField::Id)
        );
        assert_eq!(
            SmartField::from_field_name(Some("firstName")),
            Some(SmartField::FirstName)
        );
        assert_eq!(
            SmartField::from_field_name(Some("homepage_url")),
            Some(SmartField::Url)
        );
        assert_eq!(
            SmartField::from_field_name(Some("createdDate")),
            Some(SmartField::Date)
        );
        assert_eq!(SmartField::from_field_name(Some("count")), None);
        assert_eq!(SmartField::from_field_name(None), None);
    }

    #[test]
    fn test_format_matching() {
        assert_eq!(SmartField::from_format(Some("email")), Some(SmartField::Email));
        assert_eq!(
            SmartField::from_format(Some("date-time")),
            Some(SmartField::DateTime)
        );
        assert_eq!(SmartField::from_format(Some("int64")), None);
        assert_eq!(SmartField::from_format(None), None);
    }

    #[test]
    fn test_render_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(SmartField::Email.render(&mut rng).contains('@'));
        assert_eq!(SmartField::Uuid.render(&mut rng).len(), 36);
        let ip = SmartField::Ipv4.render(&mut rng);
        assert_eq!(ip.split('.').count(), 4);
        let url = SmartField::Url.render(&mut rng);
        assert!(url.starts_with("https://"));
    }
}
