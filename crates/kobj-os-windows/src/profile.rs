use std::{ops::Deref, rc::Rc};

use kobj_core::{Behavior, KobjError, MemberValues, Profile, ProfileMetadata, StructLayout};

use crate::{
    WindowsError,
    overlay::{crash_overlays, windows_overlays},
};

/// The mask of the reference count stored in the low bits of an
/// `_EX_FAST_REF` on 32-bit systems.
const MAX_FAST_REF_X86: u64 = 7;

/// The mask of the reference count stored in the low bits of an
/// `_EX_FAST_REF` on 64-bit systems.
const MAX_FAST_REF_AMD64: u64 = 15;

/// A profile of a Windows kernel.
///
/// Wraps a [`Profile`] with the Windows overlays, the crash dump overlays,
/// the behaviors of `_OBJECT_HEADER` and `_TOKEN`, and the constants the
/// Windows types depend on.
pub struct WindowsProfile {
    profile: Profile,
}

impl WindowsProfile {
    /// Creates a Windows profile from base layouts.
    pub fn new(
        metadata: ProfileMetadata,
        types: impl IntoIterator<Item = (String, StructLayout)>,
    ) -> Result<Self, KobjError> {
        let mut profile = Profile::new(metadata);
        profile.add_types(types);
        Self::from_profile(profile)
    }

    /// Layers the Windows definitions on top of an existing profile.
    ///
    /// Constants already present in the profile (such as `MAX_FAST_REF` or
    /// `ObTypeIndexTable`) are kept.
    pub fn from_profile(mut profile: Profile) -> Result<Self, KobjError> {
        let max_fast_ref = match profile.pointer_width() {
            4 => MAX_FAST_REF_X86,
            8 => MAX_FAST_REF_AMD64,
            width => return Err(WindowsError::UnsupportedPointerWidth(width).into()),
        };

        profile.add_overlays(crash_overlays());
        profile.add_overlays(windows_overlays());

        profile.register_behavior("_OBJECT_HEADER", Rc::new(ObjectHeaderBehavior));
        profile.register_behavior("_TOKEN", Rc::new(TokenBehavior));

        if profile.constant("MAX_FAST_REF").is_none() {
            profile.add_constants([("MAX_FAST_REF", max_fast_ref)]);
        }

        tracing::debug!(
            pointer_width = profile.pointer_width(),
            max_fast_ref = profile.constant("MAX_FAST_REF"),
            "windows profile ready"
        );

        Ok(Self { profile })
    }

    /// Returns the underlying profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Consumes the wrapper and returns the underlying profile.
    pub fn into_inner(self) -> Profile {
        self.profile
    }
}

impl Deref for WindowsProfile {
    type Target = Profile;

    fn deref(&self) -> &Self::Target {
        &self.profile
    }
}

/// The size of an object header is the position of its body.
struct ObjectHeaderBehavior;

impl Behavior for ObjectHeaderBehavior {
    fn size(&self, profile: &Profile, type_name: &str) -> Result<Option<u64>, KobjError> {
        let offset = profile.field_offset(type_name, "Body")?;
        Ok(Some(offset as u64))
    }
}

/// A token is plausible only with `TokenInUse` in `{0, 1}` and a session
/// number below 10.
struct TokenBehavior;

impl Behavior for TokenBehavior {
    fn is_valid(&self, view: &dyn MemberValues) -> Result<bool, KobjError> {
        let token_in_use = view.member_u64("TokenInUse")?;
        let session_id = view.member_u64("SessionId")?;

        Ok(matches!(token_in_use, 0 | 1) && session_id < 10)
    }
}
