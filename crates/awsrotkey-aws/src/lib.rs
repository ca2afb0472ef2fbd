//! AWS-backed implementation of the identity API (IAM for access keys, STS for caller identity).

pub mod iam;
