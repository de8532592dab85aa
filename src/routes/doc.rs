use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        aggregation::{
            ItemRollup, OrderStats, ReminderReport, RestaurantAggregation, RestaurantGroup,
            StatusBreakdown, UsersWithoutOrders,
        },
        auth::{LoginRequest, LoginResponse, RegisterRequest, SessionView},
        orders::{
            CancelOrderRequest, CreateOrderRequest, CreatedOrder, OrderItemRequest, OrderList,
            TrackOrderRequest, TrackedOrder, UpdateOrderStatusRequest,
        },
        projects::{
            CreateProjectRequest, OrderWindowView, ProjectAccessGranted,
            RedeemProjectTokenRequest, UpdateProjectRequest,
        },
        tokens::ValidateTokenRequest,
    },
    models::{
        ExceptionStatus, ExceptionType, Order, OrderException, OrderItem, OrderStatus, OrderType,
        OrderWithItems, Project, ProjectMembership, Role, User,
    },
    response::{ApiResponse, Meta},
    routes::{auth, health, orders, params, production, projects, tokens},
    services::access_token::{
        IssuedToken, RedeemablePayload, SubjectIds, TokenMetadata, TokenType, ValidatedToken,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        auth::me,
        projects::create_project,
        projects::update_project,
        projects::order_window,
        projects::issue_access_token,
        projects::redeem_access,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::update_order_status,
        orders::track_order,
        production::aggregate,
        production::stats,
        production::without_orders,
        production::send_reminders,
        tokens::validate_token
    ),
    components(
        schemas(
            User,
            Role,
            Project,
            ProjectMembership,
            Order,
            OrderItem,
            OrderException,
            OrderWithItems,
            OrderType,
            OrderStatus,
            ExceptionType,
            ExceptionStatus,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            SessionView,
            CreateOrderRequest,
            OrderItemRequest,
            CreatedOrder,
            UpdateOrderStatusRequest,
            CancelOrderRequest,
            TrackOrderRequest,
            TrackedOrder,
            OrderList,
            CreateProjectRequest,
            UpdateProjectRequest,
            RedeemProjectTokenRequest,
            OrderWindowView,
            ProjectAccessGranted,
            ValidateTokenRequest,
            TokenType,
            SubjectIds,
            TokenMetadata,
            RedeemablePayload,
            IssuedToken,
            ValidatedToken,
            RestaurantAggregation,
            RestaurantGroup,
            ItemRollup,
            StatusBreakdown,
            OrderStats,
            UsersWithoutOrders,
            ReminderReport,
            params::Pagination,
            params::OrderListQuery,
            params::AggregationQuery,
            params::StatsQuery,
            Meta,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<RestaurantAggregation>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Projects", description = "Projects, order windows and project access tokens"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Production", description = "Aggregation and reminders for production staff"),
        (name = "Tokens", description = "Access token validation"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
