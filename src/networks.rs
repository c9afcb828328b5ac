//! The bundled network catalog: IP addresses, domains and email.
//!
//! `IPAddress` is classifiable into `PrivateIPAddress` / `PublicIPAddress`.
//! `Email` embeds its sender and recipients, which become `FROM` and `TO`
//! relationships through [`crate::Node::create_relationships`].

use crate::error::CatalogResult;
use crate::registry::{Registry, RegistryBuilder};
use crate::schema::{Direction, FieldDecl, FieldType, NodeSchema, RelationshipSchema};
use crate::transforms::{
    CLASSIFY_IP, ENRICH_DOMAIN_LABELS, IP_VERSION_LABELS, NORMALIZE_IP, NORMALIZE_LOWERCASE,
    VALIDATE_DOMAIN, VALIDATE_EMAIL_ADDRESS,
};

/// Classifiable base for IP addresses. Accepts dynamic properties.
#[must_use]
pub fn ip_address() -> NodeSchema {
    NodeSchema::new("IPAddress")
        .field(
            FieldDecl::new("address", FieldType::String)
                .identifying()
                .normalizer(NORMALIZE_IP),
        )
        .allow_dynamic()
        .classifier(CLASSIFY_IP)
        .enricher(IP_VERSION_LABELS)
}

/// IP addresses inside private, loopback or reserved ranges.
#[must_use]
pub fn private_ip_address() -> NodeSchema {
    NodeSchema::subtype(&ip_address(), "PrivateIPAddress")
}

/// Globally routable IP addresses.
#[must_use]
pub fn public_ip_address() -> NodeSchema {
    NodeSchema::subtype(&ip_address(), "PublicIPAddress")
}

/// A fully qualified domain name, labeled `MailServer`/`WebServer` by host
/// prefix.
#[must_use]
pub fn domain() -> NodeSchema {
    NodeSchema::new("Domain")
        .field(
            FieldDecl::new("address", FieldType::String)
                .identifying()
                .normalizer(NORMALIZE_LOWERCASE)
                .validator(VALIDATE_DOMAIN),
        )
        .enricher(ENRICH_DOMAIN_LABELS)
        .role("mail_server", "MailServer")
        .role("web_server", "WebServer")
        .role("dns_server", "DNSServer")
        .role("email_domain", "EmailDomain")
}

/// A mailbox address such as `alice@example.com`.
#[must_use]
pub fn email_address() -> NodeSchema {
    NodeSchema::new("EmailAddress").field(
        FieldDecl::new("address", FieldType::String)
            .identifying()
            .normalizer(NORMALIZE_LOWERCASE)
            .validator(VALIDATE_EMAIL_ADDRESS),
    )
}

/// An email message, identified by its sender and recipients.
#[must_use]
pub fn email() -> NodeSchema {
    NodeSchema::new("Email")
        .field(
            FieldDecl::new("from_rel", FieldType::Node)
                .identifying()
                .embedded("EmailAddress", "FromRelationship", Direction::In),
        )
        .field(
            FieldDecl::new("to", FieldType::NodeList)
                .identifying()
                .optional()
                .embedded("EmailAddress", "To", Direction::Out),
        )
        .field(FieldDecl::new("subject", FieldType::String))
}

/// `HAS_IP`: a domain resolves to an IP address.
#[must_use]
pub fn has_ip() -> RelationshipSchema {
    RelationshipSchema::new("HasIP", "HAS_IP").pair("Domain", "IPAddress")
}

/// `FROM`: the sender address of an email.
#[must_use]
pub fn from_relationship() -> RelationshipSchema {
    RelationshipSchema::new("FromRelationship", "FROM").pair("EmailAddress", "Email")
}

/// `TO`: a recipient address of an email.
#[must_use]
pub fn to() -> RelationshipSchema {
    RelationshipSchema::new("To", "TO").pair("Email", "EmailAddress")
}

/// `KNOWS`: an undirected link between email addresses.
#[must_use]
pub fn knows() -> RelationshipSchema {
    RelationshipSchema::new("Knows", "KNOWS")
        .pair("EmailAddress", "EmailAddress")
        .bidirectional()
}

/// Registers every network type on `builder`.
#[must_use]
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .node(ip_address())
        .node(private_ip_address())
        .node(public_ip_address())
        .node(domain())
        .node(email_address())
        .node(email())
        .relationship(has_ip())
        .relationship(from_relationship())
        .relationship(to())
        .relationship(knows())
}

/// Builds a strict registry holding the network catalog.
///
/// # Errors
///
/// Only if the bundled schemas fail registry validation.
pub fn network_registry() -> CatalogResult<Registry> {
    register(Registry::builder()).build()
}
