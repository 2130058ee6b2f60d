use kobj_core::{AddressSpace, Class as _, KobjError, Object, Recover as _, Value};

use super::super::macros::impl_class;

/// Token group counts at or above this value are treated as garbage.
const MAX_USER_AND_GROUPS: u64 = 0xFFFF;

/// The largest number of sub-authorities a SID can hold.
const MAX_SUB_AUTHORITIES: u64 = 15;

/// A Windows access token.
///
/// A token is only considered valid if `TokenInUse` is 0 or 1 and the
/// session number is below 10.
///
/// # Implementation Details
///
/// Corresponds to `_TOKEN`.
pub struct WindowsToken<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsToken, "_TOKEN");

impl<'a, A> WindowsToken<'a, A>
where
    A: AddressSpace,
{
    /// Returns the session the token belongs to.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_TOKEN.SessionId`.
    pub fn session_id(&self) -> Result<u64, KobjError> {
        self.object.member_u64("SessionId")
    }

    /// Returns the number of user and group entries.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_TOKEN.UserAndGroupCount`.
    pub fn user_and_group_count(&self) -> Result<u64, KobjError> {
        self.object.member_u64("UserAndGroupCount")
    }

    /// Returns the SIDs of the user and groups of the token, rendered as
    /// strings.
    ///
    /// SIDs that cannot be read or fail a sanity check are skipped.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_SID_AND_ATTRIBUTES.Sid` of each entry of
    /// `_TOKEN.UserAndGroups`.
    pub fn sids(&self) -> Result<Vec<String>, KobjError> {
        let count = self.user_and_group_count()?;
        if count >= MAX_USER_AND_GROUPS {
            tracing::warn!(
                token = %self.object.offset(),
                count,
                "implausible user and group count"
            );
            return Ok(Vec::new());
        }

        let groups = match self.object.member_pointer("UserAndGroups")?.dereference()? {
            Some(Value::Array(groups)) => groups,
            _ => return Ok(Vec::new()),
        };

        let mut sids = Vec::new();
        for group in groups.iter() {
            let group = match group.recover()? {
                Some(Value::Struct(group)) => group,
                _ => continue,
            };

            let sid = match group.member_pointer("Sid").recover()? {
                Some(sid) => sid,
                None => continue,
            };

            let sid = match sid.dereference_as(WindowsSid::<A>::TYPE_NAME)? {
                Some(sid) => WindowsSid::from_object(sid),
                None => continue,
            };

            match sid.render().recover()? {
                Some(sid) => sids.push(sid),
                None => tracing::warn!(sid = %sid.object.offset(), "skipping implausible sid"),
            }
        }

        Ok(sids)
    }
}

/// A Windows security identifier.
///
/// # Implementation Details
///
/// Corresponds to `_SID`.
pub struct WindowsSid<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsSid, "_SID");

impl<A> WindowsSid<'_, A>
where
    A: AddressSpace,
{
    /// Returns the revision of the SID structure.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_SID.Revision`.
    pub fn revision(&self) -> Result<u64, KobjError> {
        self.object.member_u64("Revision")
    }

    /// Returns the number of sub-authorities.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_SID.SubAuthorityCount`.
    pub fn sub_authority_count(&self) -> Result<u64, KobjError> {
        self.object.member_u64("SubAuthorityCount")
    }

    /// Returns the identifier authority.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_SID.IdentifierAuthority`, a 48-bit big-endian
    /// value.
    pub fn identifier_authority(&self) -> Result<u64, KobjError> {
        let address = self.object.member_offset("IdentifierAuthority")?;
        let bytes = self.object.space().read_struct::<[u8; 6]>(address)?;

        Ok(bytes
            .iter()
            .fold(0, |authority, byte| (authority << 8) | u64::from(*byte)))
    }

    /// Returns the sub-authorities.
    ///
    /// Fails with [`KobjError::Implausible`] if the SID claims more than 15
    /// sub-authorities.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_SID.SubAuthority`.
    pub fn sub_authorities(&self) -> Result<Vec<u64>, KobjError> {
        if self.sub_authority_count()? > MAX_SUB_AUTHORITIES {
            return Err(KobjError::Implausible("sid sub-authority count"));
        }

        self.object
            .member_array("SubAuthority")?
            .iter()
            .map(|value| {
                value?
                    .as_u64()
                    .ok_or(KobjError::Other("sub-authority is not a scalar"))
            })
            .collect()
    }

    /// Renders the SID in its string form, e.g. `S-1-5-21-100-200-1000`.
    ///
    /// Authorities that do not fit in 32 bits are rendered in hexadecimal.
    pub fn render(&self) -> Result<String, KobjError> {
        let authority = match self.identifier_authority()? {
            authority if authority >= 1 << 32 => format!("0x{authority:012X}"),
            authority => authority.to_string(),
        };

        let mut sid = format!("S-{}-{}", self.revision()?, authority);
        for sub_authority in self.sub_authorities()? {
            sid.push('-');
            sid.push_str(&sub_authority.to_string());
        }

        Ok(sid)
    }
}
