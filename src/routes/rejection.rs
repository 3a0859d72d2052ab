use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;
use crate::record::Id;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            success: false,
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

/// The error envelope sent to clients.
#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    pub(crate) success: bool,
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// What the client was trying to do when the error happened.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Context {
    Recommend {
        sort: Option<String>,
    },
    WizardQuestions,
    ListPlaces,
    CreatePlace,
    RetrievePlace {
        id: Id,
    },
    UpdatePlace {
        id: Id,
    },
    DeletePlace {
        id: Id,
    },
    SearchPlaces {
        keyword: String,
    },
    FilterPlaces,
    PlaceReviews {
        id: Id,
    },
    CreateReview {
        place: Id,
    },
    UpdateReview {
        id: Id,
    },
    DeleteReview {
        id: Id,
    },
    Signup {
        #[serde(rename = "loginId")]
        login_id: String,
    },
    Login {
        #[serde(rename = "loginId")]
        login_id: String,
    },
    FindId,
    ResetPassword {
        #[serde(rename = "loginId")]
        login_id: String,
    },
    Availability,
    RetrieveUser {
        id: Id,
    },
    UpdateProfile {
        id: Id,
    },
    ChangePassword {
        id: Id,
    },
    DeleteUser {
        id: Id,
    },
    UserReviews {
        id: Id,
    },
    ListPets {
        user: Id,
    },
    CreatePet {
        user: Id,
    },
    UpdatePet {
        user: Id,
        id: Id,
    },
    DeletePet {
        user: Id,
        id: Id,
    },
    /// The request could not be parsed before reaching a handler.
    Request,
}

impl Context {
    pub fn handler(self) -> impl Fn(BackendError) -> Rejection {
        move |e| Rejection::new(self.clone(), e)
    }
}
