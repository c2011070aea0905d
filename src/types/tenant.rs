/// Opaque identifier of a tenant, taken verbatim from the identity claim
/// (e.g. the `sub` of a verified token). Never validated for signature here.
///
/// # What a tenant IS:
/// - An identity (the verified id handed over by the platform authorizer)
/// - A billing relationship (one plan, which fixes the limits)
/// - An owner of exactly one usage record
/// - An owner of exactly one partition of the shared vector index
///
/// # What a tenant is NOT:
/// - Not stored eagerly. Plan and usage are derived lazily (free plan,
///   all-zero usage) until the first write.
/// - Not its partition name. The partition is derived from the sanitized
///   id, see `tenancy::resolve`.
pub type TenantId = String;
