mod user;
mod forms;
mod job;
mod basket;
mod progress;

pub use user::{CurrentUser, LastData, UserMetadata, UserRecord};
pub use forms::{
    DeleteImagesForm, DeleteJobsForm, GenerateForm, ImpersonateForm, LoginForm, PageQuery,
    ProfileForm, ProgressQuery, RegisterForm, ResendForm, ResetPasswordForm, UploadFromUrlForm,
};
pub use job::{JobCounts, JobRecord, JobStatus, JobStatusRow};
pub use basket::{BasketImage, ImageLink};
pub use progress::{DownloadProgress, ProgressEntry, UnsettledCharge};
